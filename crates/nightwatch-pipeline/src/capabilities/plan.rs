use nightwatch_core::{IncidentResolutionState, PlanStep, RemediationPlan};
use serde::Deserialize;

use super::CapabilityOutcome;
use crate::error::CapabilityError;
use crate::reasoner::{Reasoner, ReasonerMessage, Tool};

const SYSTEM_PROMPT: &str = r#"You are the planning capability of an autonomous SRE agent. Given an incident graph and a feasibility assessment that declared remediation feasible, produce a remediation plan.

`steps` is an ordered list of docker commands that restore the broken state. `verification` is an ordered list of docker commands that prove the restoration worked. Every command must reference exactly one known container and must not use shell features (pipes, redirection, chaining, substitution, subshells) — a separate validator will reject anything unsafe, so prefer the simplest direct `docker` invocation that does the job.

If you are re-planning after a rejected or failed attempt, the failure context below tells you what went wrong last time; do not repeat the same mistake.

If no safe remediation exists, return empty `steps` (and empty `verification`) — the operator will be escalated to instead.

Respond with exactly one JSON object: {"summary": "...", "steps": [{"action": "docker ...", "reason": "..."}], "verification": [{"action": "docker ...", "reason": "..."}]}."#;

#[derive(Debug, Deserialize)]
struct PlanResponse {
    summary: String,
    steps: Vec<PlanStep>,
    verification: Vec<PlanStep>,
}

fn describe_failure(state: &IncidentResolutionState) -> String {
    match &state.failure_context {
        None => "No prior failure; this is the first planning attempt.".to_string(),
        Some(context) => format!("Prior attempt failed: {context:?}"),
    }
}

/// `planRemediation`. Pre: `feasibility.feasible = true`, and either no
/// prior plan or a prior plan paired with a `failureContext` (a genuine
/// replan). Carries the reasoner's private `plannerHistory` across
/// re-planning attempts so it can learn from past rejections without
/// reinstructing from scratch.
pub async fn plan_remediation(
    reasoner: &dyn Reasoner,
    tools: &[Tool],
    facts: &[String],
    state: IncidentResolutionState,
) -> Result<CapabilityOutcome, CapabilityError> {
    let feasible = matches!(&state.feasibility, Some(f) if f.feasible);
    if !feasible {
        return Ok(CapabilityOutcome::failure(
            state,
            "precondition violated: feasibility.feasible must be true",
        ));
    }
    if state.plan.is_some() && state.failure_context.is_none() {
        return Ok(CapabilityOutcome::failure(
            state,
            "precondition violated: a plan already exists with no failure context to replan from",
        ));
    }

    let known_facts = if facts.is_empty() {
        "(none)".to_string()
    } else {
        facts.join("\n")
    };
    let opening = format!(
        "Incident graph summary: {}\nFeasibility summary: {}\n{}\nFacts already known from prior sessions:\n{known_facts}",
        state
            .incident_graph
            .as_ref()
            .map(|g| g.summary.as_str())
            .unwrap_or(""),
        state
            .feasibility
            .as_ref()
            .map(|f| f.summary.as_str())
            .unwrap_or(""),
        describe_failure(&state)
    );

    let mut history = state.planner_history.clone();
    let response: PlanResponse = crate::reasoner::call(
        reasoner,
        SYSTEM_PROMPT,
        ReasonerMessage::user(opening),
        tools,
        &mut history,
    )
    .await
    .map_err(CapabilityError::Reasoner)?;

    let plan = RemediationPlan {
        summary: response.summary,
        steps: response.steps,
        verification: response.verification,
    };

    let mut next_state = state.with_plan(plan);
    next_state.planner_history = history;

    Ok(CapabilityOutcome::ok(next_state, None))
}
