use nightwatch_core::{execute_steps, FailureContext, IncidentResolutionState};

use super::CapabilityOutcome;
use crate::error::CapabilityError;

/// `executePlan`. Pre: `plan` present, `planValidated = true`,
/// `plan.steps` non-empty. Runs the remediation commands in order via the
/// core executor; on partial failure records `execution_failed` with the
/// offending command and its captured output.
pub fn execute_plan(state: IncidentResolutionState) -> Result<CapabilityOutcome, CapabilityError> {
    let Some(plan) = state.plan.clone() else {
        return Ok(CapabilityOutcome::failure(
            state,
            "precondition violated: plan must be present",
        ));
    };
    if !state.plan_validated {
        return Ok(CapabilityOutcome::failure(
            state,
            "precondition violated: plan must be validated before execution",
        ));
    }
    if plan.steps.is_empty() {
        return Ok(CapabilityOutcome::failure(
            state,
            "precondition violated: plan.steps must be non-empty",
        ));
    }

    let result = execute_steps(&plan.steps);

    if result.succeeded() {
        let next_state = state.with_execution_result(result);
        Ok(CapabilityOutcome::ok(next_state, None))
    } else {
        let failed = &result.results[result.failed_at_step as usize];
        let context = FailureContext::ExecutionFailed {
            step: failed.step.action.clone(),
            reason: format!("exit code {}", failed.exit_code),
            output: format!("stdout: {}\nstderr: {}", failed.stdout, failed.stderr),
        };
        let error = format!("step failed: {}", failed.step.action);
        let next_state = state
            .with_execution_result(result)
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
