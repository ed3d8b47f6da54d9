use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ReasonerError;

/// One turn in the conversation the gateway threads through a capability
/// call. `role` is `"user"`, `"assistant"`, or `"tool"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonerMessage {
    pub role: String,
    pub content: String,
}

impl ReasonerMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: "tool".into(),
            content: content.into(),
        }
    }
}

/// A callable the reasoner may invoke mid-turn (e.g. `inspect_container`).
#[derive(Debug, Clone, Serialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// One invocation the reasoner asked for in its last turn.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// The reasoner's response to one `generate` call: either straight text
/// (to be parsed against the caller's schema) or a set of tool calls to
/// execute before the loop continues.
#[derive(Debug, Clone, Default)]
pub struct ReasonerTurn {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone)]
pub struct ReasonerRequest {
    pub system_prompt: String,
    pub history: Vec<ReasonerMessage>,
    pub tools: Vec<ToolDeclaration>,
    /// Requests schema-constrained decoding for the repair pass.
    pub schema_constrained: bool,
}

/// Facade trait for reasoner providers. Dyn-compatible by hand, matching
/// the LLM client facade this crate's reasoner gateway is modeled on.
pub trait Reasoner: Send + Sync {
    fn generate<'a>(
        &'a self,
        request: &'a ReasonerRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ReasonerTurn, ReasonerError>> + Send + 'a>>;
}

/// An async tool handler registered alongside its declaration.
pub type ToolHandlerFn = Arc<
    dyn Fn(
            serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ReasonerError>> + Send>>
        + Send
        + Sync,
>;

#[derive(Clone)]
pub struct Tool {
    pub declaration: ToolDeclaration,
    pub handler: ToolHandlerFn,
}

/// Extract a JSON value from a reasoner response that may be wrapped in
/// markdown code fences or surrounded by prose.
pub fn extract_json<T: DeserializeOwned>(raw: &str) -> Option<T> {
    if let Ok(val) = serde_json::from_str::<T>(raw) {
        return Some(val);
    }

    let trimmed = raw.trim();
    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        let content_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let content = &after_fence[content_start..];
        if let Some(end) = content.find("```") {
            let json_str = content[..end].trim();
            if let Ok(val) = serde_json::from_str::<T>(json_str) {
                return Some(val);
            }
        }
    }

    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                let json_str = &trimmed[start..=end];
                if let Ok(val) = serde_json::from_str::<T>(json_str) {
                    return Some(val);
                }
            }
        }
    }

    None
}

const MAX_TRANSPORT_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_secs(1);

pub(crate) async fn generate_with_backoff(
    reasoner: &dyn Reasoner,
    request: &ReasonerRequest,
) -> Result<ReasonerTurn, ReasonerError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match reasoner.generate(request).await {
            Ok(turn) => return Ok(turn),
            Err(ReasonerError::ClientError(msg)) => return Err(ReasonerError::ClientError(msg)),
            Err(err) if attempt < MAX_TRANSPORT_ATTEMPTS => {
                let delay = BASE_BACKOFF * 2u32.pow(attempt - 1);
                tracing::warn!(attempt, error = %err, delay_ms = delay.as_millis() as u64, "reasoner call failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Drives one structured reasoner call end to end: sends the history,
/// executes any requested tools and loops, then parses the final text
/// response against `T`, retrying once with schema-constrained decoding on
/// a parse failure.
pub async fn call<T: DeserializeOwned>(
    reasoner: &dyn Reasoner,
    system_prompt: &str,
    opening_message: ReasonerMessage,
    tools: &[Tool],
    history: &mut Vec<ReasonerMessage>,
) -> Result<T, ReasonerError> {
    history.push(opening_message);

    loop {
        let request = ReasonerRequest {
            system_prompt: system_prompt.to_string(),
            history: history.clone(),
            tools: tools.iter().map(|t| t.declaration.clone()).collect(),
            schema_constrained: false,
        };

        let turn = generate_with_backoff(reasoner, &request).await?;

        if !turn.tool_calls.is_empty() {
            let mut futures = Vec::new();
            for call in &turn.tool_calls {
                let tool = tools.iter().find(|t| t.declaration.name == call.name);
                futures.push(run_tool_call(tool, call.clone()));
            }
            let results = futures::future::join_all(futures).await;
            for (call, result) in turn.tool_calls.iter().zip(results) {
                match result {
                    Ok(value) => history.push(ReasonerMessage::tool(format!(
                        "{}: {}",
                        call.name, value
                    ))),
                    Err(err) => {
                        history.push(ReasonerMessage::tool(format!(
                            "{}: error: {err}",
                            call.name
                        )));
                    }
                }
            }
            continue;
        }

        let Some(content) = turn.content else {
            return Err(ReasonerError::SchemaViolation(
                "reasoner returned neither text nor tool calls".into(),
            ));
        };

        if let Some(parsed) = extract_json::<T>(&content) {
            history.push(ReasonerMessage::assistant(content));
            return Ok(parsed);
        }

        history.push(ReasonerMessage::assistant(content.clone()));
        history.push(ReasonerMessage::user(
            "Your previous response was not valid JSON. Respond with strict JSON matching the required schema and nothing else.".to_string(),
        ));

        let repair_request = ReasonerRequest {
            system_prompt: system_prompt.to_string(),
            history: history.clone(),
            tools: Vec::new(),
            schema_constrained: true,
        };
        let repaired = generate_with_backoff(reasoner, &repair_request).await?;
        let repaired_content = repaired.content.ok_or_else(|| {
            ReasonerError::SchemaViolation("repair pass returned no content".into())
        })?;

        return extract_json::<T>(&repaired_content).ok_or_else(|| {
            ReasonerError::SchemaViolation(format!(
                "repair pass still not valid JSON: {}",
                &repaired_content[..repaired_content.len().min(200)]
            ))
        });
    }
}

async fn run_tool_call(
    tool: Option<&Tool>,
    call: ToolCall,
) -> Result<serde_json::Value, ReasonerError> {
    match tool {
        Some(tool) => (tool.handler)(call.arguments).await,
        None => Err(ReasonerError::UnknownTool(call.name)),
    }
}

/// Deterministic reasoner double for capability and orchestrator tests.
/// Cycles through canned turns the way `StubLlmClient` cycles through
/// canned responses.
pub struct StubReasoner {
    turns: std::sync::Mutex<Vec<ReasonerTurn>>,
    call_count: std::sync::atomic::AtomicUsize,
}

impl StubReasoner {
    pub fn new(turns: Vec<ReasonerTurn>) -> Self {
        Self {
            turns: std::sync::Mutex::new(turns),
            call_count: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn constant_json(json: serde_json::Value) -> Self {
        Self::new(vec![ReasonerTurn {
            content: Some(json.to_string()),
            tool_calls: vec![],
        }])
    }
}

impl Reasoner for StubReasoner {
    fn generate<'a>(
        &'a self,
        _request: &'a ReasonerRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ReasonerTurn, ReasonerError>> + Send + 'a>> {
        Box::pin(async move {
            let idx = self
                .call_count
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            let turns = self.turns.lock().unwrap();
            if turns.is_empty() {
                return Ok(ReasonerTurn::default());
            }
            Ok(turns[idx % turns.len()].clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_direct_json() {
        let val: serde_json::Value = extract_json(r#"{"key":"value"}"#).unwrap();
        assert_eq!(val["key"], "value");
    }

    #[test]
    fn extracts_from_code_fence() {
        let raw = "```json\n{\"key\": \"value\"}\n```";
        let val: serde_json::Value = extract_json(raw).unwrap();
        assert_eq!(val["key"], "value");
    }

    #[test]
    fn extracts_from_surrounding_text() {
        let raw = "Here you go: {\"key\": \"value\"} thanks";
        let val: serde_json::Value = extract_json(raw).unwrap();
        assert_eq!(val["key"], "value");
    }

    #[tokio::test]
    async fn call_parses_direct_json_response() {
        let reasoner = StubReasoner::constant_json(serde_json::json!({"ok": true}));
        let mut history = Vec::new();

        #[derive(serde::Deserialize)]
        struct Resp {
            ok: bool,
        }

        let result: Resp = call(
            &reasoner,
            "system",
            ReasonerMessage::user("go"),
            &[],
            &mut history,
        )
        .await
        .unwrap();
        assert!(result.ok);
    }

    #[tokio::test]
    async fn call_repairs_malformed_json_once() {
        let reasoner = StubReasoner::new(vec![
            ReasonerTurn {
                content: Some("not json at all".into()),
                tool_calls: vec![],
            },
            ReasonerTurn {
                content: Some(r#"{"ok": true}"#.into()),
                tool_calls: vec![],
            },
        ]);
        let mut history = Vec::new();

        #[derive(serde::Deserialize)]
        struct Resp {
            ok: bool,
        }

        let result: Resp = call(
            &reasoner,
            "system",
            ReasonerMessage::user("go"),
            &[],
            &mut history,
        )
        .await
        .unwrap();
        assert!(result.ok);
    }
}
