use std::sync::Arc;

use chrono::{DateTime, Utc};
use nightwatch_core::IncidentResolutionState;
use nightwatch_runtime::RuntimeDriver;
use serde::Serialize;

use crate::capabilities::{self, CapabilityName, CapabilityOutcome};
use crate::config::Mode;
use crate::error::{CapabilityError, ReasonerError};
use crate::human::{ApprovalDecision, EscalationDecision, HitlResponder};
use crate::knowledge::KnowledgeStore;
use crate::reasoner::{
    generate_with_backoff, Reasoner, ReasonerMessage, ReasonerRequest, Tool, ToolDeclaration,
    ToolHandlerFn,
};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const SELECT_SYSTEM_PROMPT: &str = r#"You are the incident-resolution orchestrator of an autonomous SRE agent. You are shown the current resolution state for one incident as JSON after each turn. Pick exactly one of the provided capability tools to invoke next and call it; do not respond with plain text.

Follow the capability contracts precisely:
- analyzeIncident needs non-empty logs and no existing incident graph.
- assessFeasibility needs an incident graph with a root.
- planRemediation needs feasibility.feasible = true, and either no existing plan or an existing plan paired with a failureContext (a genuine replan).
- validatePlan needs a plan that is not yet validated.
- requestApproval needs a validated plan, and always runs between validation and execution.
- executePlan needs a validated, non-empty plan.
- verifyPlan needs a fully successful executionResult.
- reportFindings is only available in observe mode and is terminal.
- escalate asks the human operator for missing context or to dismiss the incident; provide `reason` and `needed_context`.

If a capability's preconditions are unmet you will be told why and asked to re-pick."#;

/// One entry in the replayable audit log. Emitted as a structured
/// `tracing::info!` event as well as recorded in `OrchestrationContext`,
/// so an operator has a trail without any persisted incident-state
/// durability (§Non-goals).
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub capability: String,
    pub success: bool,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

/// Internal to the loop, never visible to a capability handler.
#[derive(Debug, Clone, Default)]
pub struct OrchestrationContext {
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub history: Vec<AuditEntry>,
    pub reasoner_history: Vec<ReasonerMessage>,
}

impl OrchestrationContext {
    fn new(max_attempts: u32) -> Self {
        Self {
            attempt_count: 0,
            max_attempts,
            history: Vec::new(),
            reasoner_history: Vec::new(),
        }
    }

    fn audit(&mut self, capability: &str, success: bool, summary: impl Into<String>) {
        let entry = AuditEntry {
            capability: capability.to_string(),
            success,
            summary: summary.into(),
            timestamp: Utc::now(),
        };
        tracing::info!(
            capability = %entry.capability,
            success = entry.success,
            summary = %entry.summary,
            "capability invocation"
        );
        self.history.push(entry);
    }
}

fn empty_params() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

fn capability_tool_declaration(name: CapabilityName) -> ToolDeclaration {
    let (description, parameters) = match name {
        CapabilityName::AnalyzeIncident => (
            "Analyze the current log batch for an infrastructure incident.",
            empty_params(),
        ),
        CapabilityName::AssessFeasibility => (
            "Assess whether a safe remediation can be produced for the current incident graph.",
            empty_params(),
        ),
        CapabilityName::PlanRemediation => (
            "Produce or revise a remediation plan for the current incident.",
            empty_params(),
        ),
        CapabilityName::ValidatePlan => (
            "Validate the current plan's commands against the safety grammar.",
            empty_params(),
        ),
        CapabilityName::RequestApproval => (
            "Ask the human operator to approve the validated plan before execution.",
            empty_params(),
        ),
        CapabilityName::ExecutePlan => (
            "Execute the validated plan's remediation commands.",
            empty_params(),
        ),
        CapabilityName::VerifyPlan => (
            "Run the plan's verification commands to confirm recovery.",
            empty_params(),
        ),
        CapabilityName::ReportFindings => (
            "Report findings to the human operator without taking remediation action.",
            empty_params(),
        ),
        CapabilityName::Escalate => (
            "Escalate to the human operator for missing context, or to dismiss the incident.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "reason": { "type": "string" },
                    "needed_context": { "type": "string" }
                },
                "required": ["reason", "needed_context"]
            }),
        ),
    };
    ToolDeclaration {
        name: name.as_str().to_string(),
        description: description.to_string(),
        parameters,
    }
}

fn capability_set(mode: Mode) -> Vec<CapabilityName> {
    use CapabilityName::*;
    match mode {
        Mode::Observe => vec![AnalyzeIncident, AssessFeasibility, Escalate, ReportFindings],
        Mode::Remediate => vec![
            AnalyzeIncident,
            AssessFeasibility,
            Escalate,
            PlanRemediation,
            ValidatePlan,
            RequestApproval,
            ExecutePlan,
            VerifyPlan,
        ],
    }
}

/// Tools that let `analyzeIncident` and `assessFeasibility` confirm live
/// container state before committing to a classification or an answer.
fn inspection_tools(runtime: Arc<dyn RuntimeDriver>) -> Vec<Tool> {
    let list_runtime = runtime.clone();
    let list_handler: ToolHandlerFn = Arc::new(move |_args| {
        let runtime = list_runtime.clone();
        Box::pin(async move {
            let summaries =
                runtime
                    .list_containers()
                    .await
                    .map_err(|e| ReasonerError::ToolFailed {
                        tool: "list_containers".into(),
                        reason: e.to_string(),
                    })?;
            Ok(serde_json::to_value(summaries).unwrap_or(serde_json::Value::Null))
        })
    });

    let inspect_handler: ToolHandlerFn = Arc::new(move |args| {
        let runtime = runtime.clone();
        Box::pin(async move {
            let name = args
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let inspection =
                runtime
                    .inspect_container(&name)
                    .await
                    .map_err(|e| ReasonerError::ToolFailed {
                        tool: "inspect_container".into(),
                        reason: e.to_string(),
                    })?;
            Ok(serde_json::to_value(inspection).unwrap_or(serde_json::Value::Null))
        })
    });

    vec![
        Tool {
            declaration: ToolDeclaration {
                name: "list_containers".into(),
                description: "List all known containers with their current state.".into(),
                parameters: empty_params(),
            },
            handler: list_handler,
        },
        Tool {
            declaration: ToolDeclaration {
                name: "inspect_container".into(),
                description: "Inspect a container's current runtime state: running, OOM-killed, restart count, health, resource limits, env keys, mounts, network.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": { "name": { "type": "string" } },
                    "required": ["name"]
                }),
            },
            handler: inspect_handler,
        },
    ]
}

/// The state-machine driver: given one batch of logs, resolves the
/// incident through a bounded sequence of capability invocations chosen
/// by the reasoner, enforcing the cross-capability invariants the
/// reasoner's system prompt alone cannot be trusted to honor.
pub struct Orchestrator {
    reasoner: Arc<dyn Reasoner>,
    runtime: Arc<dyn RuntimeDriver>,
    responder: Arc<dyn HitlResponder>,
    knowledge: Arc<dyn KnowledgeStore>,
    known_containers: Vec<String>,
    mode: Mode,
    max_attempts: u32,
}

impl Orchestrator {
    pub fn new(
        reasoner: Arc<dyn Reasoner>,
        runtime: Arc<dyn RuntimeDriver>,
        responder: Arc<dyn HitlResponder>,
        knowledge: Arc<dyn KnowledgeStore>,
        known_containers: Vec<String>,
    ) -> Self {
        Self {
            reasoner,
            runtime,
            responder,
            knowledge,
            known_containers,
            mode: Mode::Remediate,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Resolves one incident from a batch of already-filtered, already
    /// `[container] message`-formatted log lines. Runs until `resolution`
    /// leaves `pending`, or `analyzeIncident` signals idle (no actionable
    /// incident in this batch).
    pub async fn resolve(&self, logs: Vec<String>) -> (IncidentResolutionState, OrchestrationContext) {
        let mut state = IncidentResolutionState::new(logs);
        let mut ctx = OrchestrationContext::new(self.max_attempts);
        let capability_tools: Vec<ToolDeclaration> = capability_set(self.mode)
            .into_iter()
            .map(capability_tool_declaration)
            .collect();

        while state.is_pending() {
            if ctx.attempt_count >= ctx.max_attempts {
                match self.run_escalation(&mut state, &mut ctx, "circuit breaker: maximum replan attempts reached without progress", "additional context to continue, or dismiss the incident").await {
                    Ok(()) => {
                        if !state.is_pending() {
                            break;
                        }
                        ctx.attempt_count = 0;
                        continue;
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "unexpected orchestration error during circuit-breaker escalation");
                        break;
                    }
                }
            }

            let state_json = serde_json::to_string(&state).unwrap_or_default();
            ctx.reasoner_history.push(ReasonerMessage::user(state_json));

            let request = ReasonerRequest {
                system_prompt: SELECT_SYSTEM_PROMPT.to_string(),
                history: ctx.reasoner_history.clone(),
                tools: capability_tools.clone(),
                schema_constrained: false,
            };

            let turn = match generate_with_backoff(&*self.reasoner, &request).await {
                Ok(turn) => turn,
                Err(err) => {
                    tracing::error!(error = %err, "unexpected orchestration error");
                    ctx.reasoner_history.push(ReasonerMessage::user(
                        "An internal error occurred contacting the reasoner. Please pick a capability again.".to_string(),
                    ));
                    continue;
                }
            };

            let Some(call) = turn.tool_calls.first().cloned() else {
                ctx.reasoner_history.push(ReasonerMessage::user(
                    "You must call exactly one of the provided capability tools. Please pick one now.".to_string(),
                ));
                continue;
            };

            let Some(name) = CapabilityName::from_wire(&call.name) else {
                tracing::warn!(capability = %call.name, "reasoner selected an unknown capability");
                ctx.reasoner_history.push(ReasonerMessage::user(format!(
                    "\"{}\" is not a known capability. Please pick one of the provided tools.",
                    call.name
                )));
                continue;
            };

            match name {
                CapabilityName::RequestApproval => {
                    match self.dispatch_request_approval(&mut state, &mut ctx).await {
                        Ok(()) => {}
                        Err(err) => {
                            tracing::error!(error = %err, "unexpected orchestration error in requestApproval");
                        }
                    }
                }
                CapabilityName::Escalate => {
                    let reason = call
                        .arguments
                        .get("reason")
                        .and_then(|v| v.as_str())
                        .unwrap_or("escalation requested by reasoner")
                        .to_string();
                    let needed_context = call
                        .arguments
                        .get("needed_context")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string();
                    if let Err(err) = self
                        .run_escalation(&mut state, &mut ctx, &reason, &needed_context)
                        .await
                    {
                        tracing::error!(error = %err, "unexpected orchestration error in escalate");
                    }
                }
                other => {
                    let had_failure_context = state.failure_context.is_some();
                    let current = state.clone();
                    let outcome = self.dispatch_capability(other, current).await;
                    match outcome {
                        Ok(outcome) => {
                            if other == CapabilityName::PlanRemediation && had_failure_context {
                                ctx.attempt_count += 1;
                            }
                            ctx.audit(
                                other.as_str(),
                                outcome.success,
                                outcome
                                    .error
                                    .clone()
                                    .unwrap_or_else(|| "ok".to_string()),
                            );
                            ctx.reasoner_history.push(ReasonerMessage::tool(format!(
                                "{}: success={} {}",
                                call.name,
                                outcome.success,
                                outcome.error.as_deref().unwrap_or("")
                            )));
                            let idle = outcome.idle;
                            state = outcome.state;
                            if idle {
                                return (state, ctx);
                            }
                        }
                        Err(err) => {
                            tracing::error!(error = %err, capability = other.as_str(), "capability handler raised an error");
                            ctx.audit(other.as_str(), false, err.to_string());
                            ctx.reasoner_history.push(ReasonerMessage::tool(format!(
                                "{}: error: {err}",
                                call.name
                            )));
                        }
                    }
                }
            }
        }

        (state, ctx)
    }

    async fn dispatch_capability(
        &self,
        name: CapabilityName,
        state: IncidentResolutionState,
    ) -> Result<CapabilityOutcome, CapabilityError> {
        let tools = inspection_tools(self.runtime.clone());
        match name {
            CapabilityName::AnalyzeIncident => {
                capabilities::analyze::analyze_incident(&*self.reasoner, &tools, state).await
            }
            CapabilityName::AssessFeasibility => {
                let facts = self.knowledge.facts().await?;
                capabilities::feasibility::assess_feasibility(
                    &*self.reasoner,
                    self.responder.clone(),
                    self.knowledge.clone(),
                    &facts,
                    &tools,
                    state,
                )
                .await
            }
            CapabilityName::PlanRemediation => {
                let facts = self.knowledge.facts().await?;
                capabilities::plan::plan_remediation(&*self.reasoner, &[], &facts, state).await
            }
            CapabilityName::ValidatePlan => {
                capabilities::validate::validate_plan_capability(&self.known_containers, state)
            }
            CapabilityName::ExecutePlan => capabilities::execute::execute_plan(state),
            CapabilityName::VerifyPlan => capabilities::verify::verify_plan(state),
            CapabilityName::ReportFindings => {
                capabilities::report::report_findings(&*self.reasoner, state).await
            }
            CapabilityName::RequestApproval | CapabilityName::Escalate => {
                unreachable!("handled inline by the orchestrator loop")
            }
        }
    }

    /// `requestApproval` (§4.3.5): special-cased because it needs
    /// arguments from the current turn (none, here) and can terminate
    /// progress toward execution. Pre: `planValidated = true`.
    async fn dispatch_request_approval(
        &self,
        state: &mut IncidentResolutionState,
        ctx: &mut OrchestrationContext,
    ) -> Result<(), CapabilityError> {
        if !state.plan_validated {
            ctx.audit(
                CapabilityName::RequestApproval.as_str(),
                false,
                "precondition violated: planValidated must be true",
            );
            ctx.reasoner_history.push(ReasonerMessage::tool(
                "requestApproval: error: precondition violated: planValidated must be true"
                    .to_string(),
            ));
            return Ok(());
        }

        let summary = state
            .plan
            .as_ref()
            .map(|p| p.summary.clone())
            .unwrap_or_default();
        let decision = self
            .responder
            .request_approval(&summary)
            .await
            .map_err(|e| CapabilityError::Human(e.to_string()))?;

        match decision {
            ApprovalDecision::Approved => {
                ctx.audit(CapabilityName::RequestApproval.as_str(), true, "approved");
                ctx.reasoner_history
                    .push(ReasonerMessage::tool("requestApproval: approved".to_string()));
            }
            ApprovalDecision::Rejected { feedback } => {
                *state = std::mem::replace(state, IncidentResolutionState::new(Vec::new()))
                    .with_user_rejected(feedback.clone());
                ctx.audit(
                    CapabilityName::RequestApproval.as_str(),
                    false,
                    format!("rejected: {feedback}"),
                );
                ctx.reasoner_history.push(ReasonerMessage::tool(format!(
                    "requestApproval: rejected: {feedback}"
                )));
            }
        }
        Ok(())
    }

    /// `escalate` (§4.3.9), also reused for the circuit-breaker path
    /// (§4.6 item 1). `continue` persists the human's context as a fact,
    /// clears `failureContext`, and resets `feasibility` to absent iff it
    /// was `feasible = false` so the next loop re-assesses it. `dismiss`
    /// ends the incident.
    async fn run_escalation(
        &self,
        state: &mut IncidentResolutionState,
        ctx: &mut OrchestrationContext,
        reason: &str,
        needed_context: &str,
    ) -> Result<(), CapabilityError> {
        let decision = self
            .responder
            .escalate(reason, needed_context)
            .await
            .map_err(|e| CapabilityError::Human(e.to_string()))?;

        match decision {
            EscalationDecision::Dismiss => {
                *state = std::mem::replace(state, IncidentResolutionState::new(Vec::new()))
                    .with_resolution(nightwatch_core::Resolution::Dismissed);
                ctx.audit(CapabilityName::Escalate.as_str(), true, "dismissed by operator");
            }
            EscalationDecision::Continue { context } => {
                self.knowledge
                    .record_fact(needed_context, &context)
                    .await
                    .map_err(|e| CapabilityError::Knowledge(e.to_string()))?;
                let was_infeasible = matches!(&state.feasibility, Some(f) if !f.feasible);
                let mut next = std::mem::replace(state, IncidentResolutionState::new(Vec::new()))
                    .with_failure_context(None);
                if was_infeasible {
                    next = next.with_feasibility(None);
                }
                *state = next;
                ctx.audit(
                    CapabilityName::Escalate.as_str(),
                    true,
                    format!("operator provided context: {context}"),
                );
            }
        }
        Ok(())
    }
}
