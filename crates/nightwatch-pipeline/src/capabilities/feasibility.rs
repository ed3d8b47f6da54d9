use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nightwatch_core::{FeasibilityAssessment, IncidentResolutionState};
use serde::Deserialize;

use super::CapabilityOutcome;
use crate::error::CapabilityError;
use crate::human::HitlResponder;
use crate::knowledge::KnowledgeStore;
use crate::reasoner::{Reasoner, ReasonerMessage, Tool, ToolDeclaration, ToolHandlerFn};

const SYSTEM_PROMPT: &str = r#"You are the feasibility capability of an autonomous SRE agent. Given an incident graph, decide whether a safe, deterministic remediation can be produced.

A parameter (e.g. a memory limit, a retry budget, an acceptable downtime window) is "known" only if configuration or the knowledge store positively states it. Its absence is not a value you may assume — ask the user via `ask_user` if you need it and it is not already known.

Ask the user at most one question at a time.

Respond with exactly one JSON object: {"feasible": bool, "summary": "...", "blocking_reason": "..." or null}. `blocking_reason` must be present iff `feasible` is false."#;

#[derive(Debug, Deserialize)]
struct FeasibilityResponse {
    feasible: bool,
    summary: String,
    blocking_reason: Option<String>,
}

fn ask_user_tool(
    responder: Arc<dyn HitlResponder>,
    knowledge: Arc<dyn KnowledgeStore>,
    skipped: Arc<AtomicBool>,
) -> Tool {
    let handler: ToolHandlerFn = Arc::new(move |args| {
        let responder = responder.clone();
        let knowledge = knowledge.clone();
        let skipped = skipped.clone();
        Box::pin(async move {
            let question = args
                .get("question")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let answer = responder
                .ask_feasibility_question(&question)
                .await
                .map_err(|e| crate::error::ReasonerError::ToolFailed {
                    tool: "ask_user".into(),
                    reason: e.to_string(),
                })?;
            match answer {
                Some(answer) => {
                    knowledge
                        .record_fact(&question, &answer)
                        .await
                        .map_err(|e| crate::error::ReasonerError::ToolFailed {
                            tool: "ask_user".into(),
                            reason: e.to_string(),
                        })?;
                    Ok(serde_json::json!({ "answer": answer }))
                }
                None => {
                    skipped.store(true, Ordering::SeqCst);
                    Ok(serde_json::json!({ "answer": null, "skipped": true }))
                }
            }
        })
    });

    Tool {
        declaration: ToolDeclaration {
            name: "ask_user".into(),
            description: "Ask the human operator a single feasibility question. Returns null if skipped.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "question": { "type": "string" } },
                "required": ["question"]
            }),
        },
        handler,
    }
}

pub async fn assess_feasibility(
    reasoner: &dyn Reasoner,
    responder: Arc<dyn HitlResponder>,
    knowledge: Arc<dyn KnowledgeStore>,
    facts: &[String],
    inspection_tools: &[Tool],
    state: IncidentResolutionState,
) -> Result<CapabilityOutcome, CapabilityError> {
    let Some(graph) = &state.incident_graph else {
        return Ok(CapabilityOutcome::failure(
            state,
            "precondition violated: incidentGraph must be present",
        ));
    };
    if graph.root.is_none() {
        return Ok(CapabilityOutcome::failure(
            state,
            "precondition violated: incidentGraph must have a root",
        ));
    }

    let skipped = Arc::new(AtomicBool::new(false));
    let mut tools: Vec<Tool> = inspection_tools.to_vec();
    tools.push(ask_user_tool(responder, knowledge, skipped.clone()));

    let known_facts = if facts.is_empty() {
        "(none)".to_string()
    } else {
        facts.join("\n")
    };
    let opening = format!(
        "Incident graph summary: {}\nRoot node: {}\nFacts already known from prior sessions:\n{known_facts}",
        graph.summary,
        graph.root.unwrap()
    );

    let mut history = Vec::new();
    let response: FeasibilityResponse = crate::reasoner::call(
        reasoner,
        SYSTEM_PROMPT,
        ReasonerMessage::user(opening),
        &tools,
        &mut history,
    )
    .await
    .map_err(CapabilityError::Reasoner)?;

    let assessment = if skipped.load(Ordering::SeqCst) {
        FeasibilityAssessment::infeasible(
            response.summary,
            "user skipped a question required to assess feasibility",
        )
    } else if response.feasible {
        FeasibilityAssessment::feasible(response.summary)
    } else {
        FeasibilityAssessment::infeasible(
            response.summary,
            response
                .blocking_reason
                .unwrap_or_else(|| "reasoner reported infeasible with no reason".into()),
        )
    };

    let next_state = state.with_feasibility(Some(assessment));
    Ok(CapabilityOutcome::ok(next_state, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoner::StubReasoner;
    use nightwatch_core::{IncidentEdge, IncidentGraph, IncidentNode};

    struct NeverAskedResponder;
    impl HitlResponder for NeverAskedResponder {
        fn ask_feasibility_question<'a>(
            &'a self,
            _question: &'a str,
        ) -> std::pin::Pin<
            Box<
                dyn std::future::Future<Output = Result<Option<String>, CapabilityError>>
                    + Send
                    + 'a,
            >,
        > {
            Box::pin(async move { Ok(Some("512mb".into())) })
        }

        fn request_approval<'a>(
            &'a self,
            _summary: &'a str,
        ) -> std::pin::Pin<
            Box<
                dyn std::future::Future<Output = Result<crate::human::ApprovalDecision, CapabilityError>>
                    + Send
                    + 'a,
            >,
        > {
            unimplemented!()
        }

        fn escalate<'a>(
            &'a self,
            _reason: &'a str,
            _needed_context: &'a str,
        ) -> std::pin::Pin<
            Box<
                dyn std::future::Future<Output = Result<crate::human::EscalationDecision, CapabilityError>>
                    + Send
                    + 'a,
            >,
        > {
            unimplemented!()
        }
    }

    struct NoopKnowledgeStore;
    impl KnowledgeStore for NoopKnowledgeStore {
        fn record_fact<'a>(
            &'a self,
            _question: &'a str,
            _answer: &'a str,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), CapabilityError>> + Send + 'a>>
        {
            Box::pin(async move { Ok(()) })
        }

        fn facts<'a>(
            &'a self,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<Vec<String>, CapabilityError>> + Send + 'a>,
        > {
            Box::pin(async move { Ok(Vec::new()) })
        }
    }

    fn graph_state() -> IncidentResolutionState {
        let graph = IncidentGraph::new(
            vec![IncidentNode {
                container: "cache".into(),
                kind: "resource.cache.oom_killed".into(),
                evidence: vec!["oom".into()],
                timestamp: chrono::Utc::now(),
            }],
            vec![],
            Some(0),
            "cache OOM".into(),
        )
        .unwrap();
        IncidentResolutionState::new(vec!["[cache] oom".into()]).with_incident_graph(Some(graph))
    }

    #[tokio::test]
    async fn rejects_missing_graph() {
        let reasoner = StubReasoner::constant_json(serde_json::json!({"feasible": true, "summary": "ok", "blocking_reason": null}));
        let responder: Arc<dyn HitlResponder> = Arc::new(NeverAskedResponder);
        let knowledge: Arc<dyn KnowledgeStore> = Arc::new(NoopKnowledgeStore);
        let outcome = assess_feasibility(
            &reasoner,
            responder,
            knowledge,
            &[],
            &[],
            IncidentResolutionState::new(vec!["x".into()]),
        )
        .await
        .unwrap();
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn feasible_response_sets_assessment() {
        let reasoner = StubReasoner::constant_json(
            serde_json::json!({"feasible": true, "summary": "restart is safe", "blocking_reason": null}),
        );
        let responder: Arc<dyn HitlResponder> = Arc::new(NeverAskedResponder);
        let knowledge: Arc<dyn KnowledgeStore> = Arc::new(NoopKnowledgeStore);
        let outcome = assess_feasibility(&reasoner, responder, knowledge, &[], &[], graph_state())
            .await
            .unwrap();
        assert!(outcome.state.feasibility.unwrap().feasible);
    }

    #[tokio::test]
    async fn missing_root_is_rejected() {
        let graph = IncidentGraph::new(vec![], vec![], None, "nothing".into()).unwrap();
        let state =
            IncidentResolutionState::new(vec!["x".into()]).with_incident_graph(Some(graph));
        let reasoner = StubReasoner::constant_json(serde_json::json!({"feasible": true, "summary": "ok", "blocking_reason": null}));
        let responder: Arc<dyn HitlResponder> = Arc::new(NeverAskedResponder);
        let knowledge: Arc<dyn KnowledgeStore> = Arc::new(NoopKnowledgeStore);
        let outcome = assess_feasibility(&reasoner, responder, knowledge, &[], &[], state)
            .await
            .unwrap();
        assert!(!outcome.success);
    }
}
