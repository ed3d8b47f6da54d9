use nightwatch_core::{IncidentEdge, IncidentGraph, IncidentNode, IncidentResolutionState};
use serde::Deserialize;

use super::CapabilityOutcome;
use crate::error::CapabilityError;
use crate::reasoner::{Reasoner, ReasonerMessage, Tool};

const SYSTEM_PROMPT: &str = r#"You are the analysis capability of an autonomous SRE agent. You are given a batch of container log lines and must decide whether they describe an infrastructure incident.

Classify as an incident node ONLY infrastructure-level failures: databases, caches, object storage, networking, container lifecycle (crash, OOM kill, restart loop), resource limits, or unavailability of an external dependency. Application-logic errors (validation errors, business-rule rejections, expected 4xx responses) are NOT incidents.

If a container's failure is stale — you inspect it and it is currently healthy — discard that node; it already resolved itself.

You may call `list_containers` and `inspect_container` to confirm current state before deciding.

When you are done, respond with exactly one JSON object:
- No actionable incident: {"idle": true}
- An incident: {"idle": false, "graph": {"nodes": [{"container": "...", "type": "category.service.failure", "evidence": ["..."], "timestamp": "2024-01-01T00:00:00Z"}], "edges": [{"from": 0, "to": 1}], "root": 0, "summary": "..."}}

Do not include any text outside the JSON object."#;

#[derive(Debug, Deserialize)]
struct GraphPayload {
    nodes: Vec<IncidentNode>,
    edges: Vec<IncidentEdge>,
    root: Option<usize>,
    summary: String,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    idle: bool,
    graph: Option<GraphPayload>,
}

pub async fn analyze_incident(
    reasoner: &dyn Reasoner,
    tools: &[Tool],
    state: IncidentResolutionState,
) -> Result<CapabilityOutcome, CapabilityError> {
    if state.logs.is_empty() {
        return Ok(CapabilityOutcome::failure(
            state,
            "precondition violated: logs must be non-empty",
        ));
    }
    if state.incident_graph.is_some() {
        return Ok(CapabilityOutcome::failure(
            state,
            "precondition violated: incidentGraph already present",
        ));
    }

    let opening = state
        .logs
        .iter()
        .enumerate()
        .map(|(i, line)| format!("[{i}] {line}"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut history = Vec::new();
    let response: AnalyzeResponse = crate::reasoner::call(
        reasoner,
        SYSTEM_PROMPT,
        ReasonerMessage::user(opening),
        tools,
        &mut history,
    )
    .await
    .map_err(CapabilityError::Reasoner)?;

    if response.idle || response.graph.is_none() {
        return Ok(CapabilityOutcome::idle(state));
    }

    let payload = response.graph.unwrap();
    let graph = IncidentGraph::new(payload.nodes, payload.edges, payload.root, payload.summary)
        .map_err(CapabilityError::Core)?;

    let next_state = state.with_incident_graph(Some(graph));
    Ok(CapabilityOutcome::ok(next_state, None))
}
