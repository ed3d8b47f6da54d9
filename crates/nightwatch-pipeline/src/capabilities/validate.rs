use nightwatch_core::{validate_plan, FailureContext, IncidentResolutionState, PlanSection};

use super::CapabilityOutcome;
use crate::error::CapabilityError;

/// `validatePlan`. Pre: `plan` present and not yet validated. Pure and
/// synchronous — the reasoner is not trusted to produce safe commands, so
/// this capability never calls it.
pub fn validate_plan_capability(
    known_containers: &[String],
    state: IncidentResolutionState,
) -> Result<CapabilityOutcome, CapabilityError> {
    let Some(plan) = state.plan.clone() else {
        return Ok(CapabilityOutcome::failure(
            state,
            "precondition violated: plan must be present",
        ));
    };
    if state.plan_validated {
        return Ok(CapabilityOutcome::failure(
            state,
            "precondition violated: plan is already validated",
        ));
    }

    match validate_plan(&plan, known_containers) {
        Ok(()) => {
            let next_state = state.with_plan_validated(true);
            Ok(CapabilityOutcome::ok(next_state, None))
        }
        Err(rejection) => {
            let reason = rejection.reason.to_string();
            let context = match rejection.section {
                PlanSection::Remediation => FailureContext::RemediationCommandRejected {
                    step: rejection.step.action.clone(),
                    reason: reason.clone(),
                },
                PlanSection::Verification => FailureContext::VerificationCommandRejected {
                    step: rejection.step.action.clone(),
                    reason: reason.clone(),
                },
            };
            let next_state = state.with_failure_context(Some(context));
            Ok(CapabilityOutcome {
                state: next_state,
                success: false,
                data: None,
                error: Some(format!("command rejected: {} ({reason})", rejection.step.action)),
                idle: false,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nightwatch_core::{PlanStep, RemediationPlan};

    fn containers() -> Vec<String> {
        vec!["cache".into()]
    }

    fn state_with_plan(plan: RemediationPlan) -> IncidentResolutionState {
        IncidentResolutionState::new(vec!["x".into()]).with_plan(plan)
    }

    #[test]
    fn rejects_missing_plan() {
        let outcome = validate_plan_capability(
            &containers(),
            IncidentResolutionState::new(vec!["x".into()]),
        )
        .unwrap();
        assert!(!outcome.success);
    }

    #[test]
    fn rejects_already_validated_plan() {
        let plan = RemediationPlan {
            summary: "restart".into(),
            steps: vec![PlanStep {
                action: "docker start cache".into(),
                reason: "stopped".into(),
            }],
            verification: vec![],
        };
        let state = state_with_plan(plan).with_plan_validated(true);
        let outcome = validate_plan_capability(&containers(), state).unwrap();
        assert!(!outcome.success);
    }

    #[test]
    fn accepts_clean_plan() {
        let plan = RemediationPlan {
            summary: "restart".into(),
            steps: vec![PlanStep {
                action: "docker start cache".into(),
                reason: "stopped".into(),
            }],
            verification: vec![PlanStep {
                action: "docker inspect cache".into(),
                reason: "confirm".into(),
            }],
        };
        let outcome = validate_plan_capability(&containers(), state_with_plan(plan)).unwrap();
        assert!(outcome.success);
        assert!(outcome.state.plan_validated);
    }

    #[test]
    fn rejects_unsafe_command_and_tags_remediation() {
        let plan = RemediationPlan {
            summary: "restart".into(),
            steps: vec![PlanStep {
                action: "docker exec cache sh -c \"echo hi\"".into(),
                reason: "stopped".into(),
            }],
            verification: vec![],
        };
        let outcome = validate_plan_capability(&containers(), state_with_plan(plan)).unwrap();
        assert!(!outcome.success);
        assert!(!outcome.state.plan_validated);
        assert!(matches!(
            outcome.state.failure_context,
            Some(FailureContext::RemediationCommandRejected { .. })
        ));
    }

    #[test]
    fn rejects_unsafe_verification_and_tags_verification() {
        let plan = RemediationPlan {
            summary: "restart".into(),
            steps: vec![PlanStep {
                action: "docker start cache".into(),
                reason: "stopped".into(),
            }],
            verification: vec![PlanStep {
                action: "docker exec cache rm -rf /".into(),
                reason: "confirm".into(),
            }],
        };
        let outcome = validate_plan_capability(&containers(), state_with_plan(plan)).unwrap();
        assert!(!outcome.success);
        assert!(matches!(
            outcome.state.failure_context,
            Some(FailureContext::VerificationCommandRejected { .. })
        ));
    }
}
