pub mod analyze;
pub mod execute;
pub mod feasibility;
pub mod plan;
pub mod report;
pub mod validate;
pub mod verify;

use nightwatch_core::IncidentResolutionState;

/// The uniform contract every capability in the library returns. `idle` is
/// only ever set by `analyzeIncident`; every other capability leaves it
/// `false`.
#[derive(Debug, Clone)]
pub struct CapabilityOutcome {
    pub state: IncidentResolutionState,
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub idle: bool,
}

impl CapabilityOutcome {
    pub fn ok(state: IncidentResolutionState, data: Option<serde_json::Value>) -> Self {
        Self {
            state,
            success: true,
            data,
            error: None,
            idle: false,
        }
    }

    pub fn idle(state: IncidentResolutionState) -> Self {
        Self {
            state,
            success: true,
            data: None,
            error: None,
            idle: true,
        }
    }

    /// A precondition violation or other failure: the state is returned
    /// unchanged so the reasoner can re-pick with the failure reason as
    /// context.
    pub fn failure(state: IncidentResolutionState, error: impl Into<String>) -> Self {
        Self {
            state,
            success: false,
            data: None,
            error: Some(error.into()),
            idle: false,
        }
    }
}

/// Identifies a capability by its wire name, used both for mode-gated tool
/// exposure and for audit log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityName {
    AnalyzeIncident,
    AssessFeasibility,
    PlanRemediation,
    ValidatePlan,
    RequestApproval,
    ExecutePlan,
    VerifyPlan,
    ReportFindings,
    Escalate,
}

impl CapabilityName {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityName::AnalyzeIncident => "analyzeIncident",
            CapabilityName::AssessFeasibility => "assessFeasibility",
            CapabilityName::PlanRemediation => "planRemediation",
            CapabilityName::ValidatePlan => "validatePlan",
            CapabilityName::RequestApproval => "requestApproval",
            CapabilityName::ExecutePlan => "executePlan",
            CapabilityName::VerifyPlan => "verifyPlan",
            CapabilityName::ReportFindings => "reportFindings",
            CapabilityName::Escalate => "escalate",
        }
    }

    /// Parses a capability's wire name back into its tag. Returns `None`
    /// for anything the reasoner might hallucinate — an unknown tag is a
    /// protocol error at the orchestrator boundary, not a panic here.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "analyzeIncident" => Some(CapabilityName::AnalyzeIncident),
            "assessFeasibility" => Some(CapabilityName::AssessFeasibility),
            "planRemediation" => Some(CapabilityName::PlanRemediation),
            "validatePlan" => Some(CapabilityName::ValidatePlan),
            "requestApproval" => Some(CapabilityName::RequestApproval),
            "executePlan" => Some(CapabilityName::ExecutePlan),
            "verifyPlan" => Some(CapabilityName::VerifyPlan),
            "reportFindings" => Some(CapabilityName::ReportFindings),
            "escalate" => Some(CapabilityName::Escalate),
            _ => None,
        }
    }
}
