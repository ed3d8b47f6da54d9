use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::ReasonerError;
use crate::reasoner::{Reasoner, ReasonerRequest, ReasonerTurn, ToolCall};

/// Talks to a structured-generation endpoint over HTTP: an opening system
/// instruction, the running conversation, and the tool declarations for
/// this call, in one JSON POST.
pub struct HttpReasoner {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpReasoner {
    pub fn new(base_url: String, model: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            model,
            api_key,
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: &'a [crate::reasoner::ReasonerMessage],
    tools: &'a [crate::reasoner::ToolDeclaration],
    thinking: bool,
    schema_constrained: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

impl Reasoner for HttpReasoner {
    fn generate<'a>(
        &'a self,
        request: &'a ReasonerRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ReasonerTurn, ReasonerError>> + Send + 'a>> {
        Box::pin(async move {
            let body = GenerateRequest {
                model: &self.model,
                system: &request.system_prompt,
                messages: &request.history,
                tools: &request.tools,
                thinking: true,
                schema_constrained: request.schema_constrained,
            };

            let mut req = self
                .client
                .post(format!("{}/generate", self.base_url))
                .json(&body);
            if let Some(key) = &self.api_key {
                req = req.bearer_auth(key);
            }

            let response = req
                .send()
                .await
                .map_err(|e| ReasonerError::Transport(e.to_string()))?;

            let status = response.status();
            if status.is_client_error() {
                let text = response.text().await.unwrap_or_default();
                return Err(ReasonerError::ClientError(format!("{status}: {text}")));
            }
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(ReasonerError::Transport(format!("{status}: {text}")));
            }

            let parsed: GenerateResponse = response
                .json()
                .await
                .map_err(|e| ReasonerError::Transport(e.to_string()))?;

            Ok(ReasonerTurn {
                content: parsed.content,
                tool_calls: parsed.tool_calls,
            })
        })
    }
}
