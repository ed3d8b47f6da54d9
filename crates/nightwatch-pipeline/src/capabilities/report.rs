use nightwatch_core::{IncidentResolutionState, Resolution};
use serde::Deserialize;

use super::CapabilityOutcome;
use crate::error::CapabilityError;
use crate::reasoner::{Reasoner, ReasonerMessage};

const SYSTEM_PROMPT: &str = r#"You are the reporting capability of an autonomous SRE agent running in observe mode. Summarize the incident graph and feasibility assessment for a human operator who will act on it manually.

Respond with exactly one JSON object: {"summary": "..."}."#;

#[derive(Debug, Deserialize)]
struct ReportResponse {
    summary: String,
}

/// `reportFindings`. Observe-mode terminal capability: sets `resolution =
/// observed`. Pre: `incidentGraph` present (there is nothing to report on
/// otherwise).
pub async fn report_findings(
    reasoner: &dyn Reasoner,
    state: IncidentResolutionState,
) -> Result<CapabilityOutcome, CapabilityError> {
    let Some(graph) = &state.incident_graph else {
        return Ok(CapabilityOutcome::failure(
            state,
            "precondition violated: incidentGraph must be present",
        ));
    };

    let opening = format!(
        "Incident graph summary: {}\nFeasibility: {}",
        graph.summary,
        state
            .feasibility
            .as_ref()
            .map(|f| f.summary.as_str())
            .unwrap_or("not assessed")
    );

    let mut history = Vec::new();
    let response: ReportResponse = crate::reasoner::call(
        reasoner,
        SYSTEM_PROMPT,
        ReasonerMessage::user(opening),
        &[],
        &mut history,
    )
    .await
    .map_err(CapabilityError::Reasoner)?;

    let next_state = state.with_resolution(Resolution::Observed);
    Ok(CapabilityOutcome::ok(
        next_state,
        Some(serde_json::json!({ "summary": response.summary })),
    ))
}
