pub mod error;
pub mod executor;
pub mod types;
pub mod validator;

pub use error::CoreError;
pub use executor::execute_steps;
pub use types::{
    ExecutionResult, FailureContext, FeasibilityAssessment, IncidentEdge, IncidentGraph,
    IncidentNode, IncidentResolutionState, PlanStep, RemediationPlan, Resolution, StepResult,
    StepStatus,
};
pub use validator::{contains_word, validate_command, validate_plan, PlanRejection, PlanSection, RejectionReason};
