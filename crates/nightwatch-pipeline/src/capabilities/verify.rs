use nightwatch_core::{execute_steps, ExecutionResult, FailureContext, IncidentResolutionState, Resolution};

use super::CapabilityOutcome;
use crate::error::CapabilityError;

/// `verifyPlan`. Pre: `executionResult.failedAtStep = -1`. Empty
/// `plan.verification` resolves the incident without running anything;
/// otherwise runs the verification commands and resolves on full success,
/// or records `verification_failed` on the first failing step.
pub fn verify_plan(state: IncidentResolutionState) -> Result<CapabilityOutcome, CapabilityError> {
    let Some(execution_result) = state.execution_result.clone() else {
        return Ok(CapabilityOutcome::failure(
            state,
            "precondition violated: executionResult must be present",
        ));
    };
    if !execution_result.succeeded() {
        return Ok(CapabilityOutcome::failure(
            state,
            "precondition violated: execution must have fully succeeded",
        ));
    }
    let Some(plan) = state.plan.clone() else {
        return Ok(CapabilityOutcome::failure(
            state,
            "precondition violated: plan must be present",
        ));
    };

    if plan.verification.is_empty() {
        let next_state = state
            .with_verification_result(ExecutionResult::empty())
            .with_resolution(Resolution::Resolved);
        return Ok(CapabilityOutcome::ok(next_state, None));
    }

    let result = execute_steps(&plan.verification);

    if result.succeeded() {
        let next_state = state
            .with_verification_result(result)
            .with_resolution(Resolution::Resolved);
        Ok(CapabilityOutcome::ok(next_state, None))
    } else {
        let failed = &result.results[result.failed_at_step as usize];
        let context = FailureContext::VerificationFailed {
            step: failed.step.action.clone(),
            reason: format!("exit code {}", failed.exit_code),
            output: format!("stdout: {}\nstderr: {}", failed.stdout, failed.stderr),
        };
        let error = format!("verification failed: {}", failed.step.action);
        let next_state = state
            .with_verification_result(result)
            .with_failure_context(Some(context));
        Ok(CapabilityOutcome {
            state: next_state,
            success: false,
            data: None,
            error: Some(error),
            idle: false,
        })
    }
}
