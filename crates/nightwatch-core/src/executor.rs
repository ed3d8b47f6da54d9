use std::process::Command;

use tracing::{debug, warn};

use crate::types::{ExecutionResult, PlanStep, StepResult};

/// Runs `steps` sequentially via direct process invocation (no shell
/// wrapper), stopping at the first failure. Imposes no timeout; cancellation
/// is inherited from the caller.
pub fn execute_steps(steps: &[PlanStep]) -> ExecutionResult {
    let mut results = Vec::with_capacity(steps.len());
    let mut failed_at_step: i64 = -1;

    for (index, step) in steps.iter().enumerate() {
        let result = run_one(step);
        let failed = result.status == crate::types::StepStatus::Failure;
        results.push(result);
        if failed {
            failed_at_step = index as i64;
            break;
        }
    }

    ExecutionResult {
        results,
        failed_at_step,
    }
}

fn run_one(step: &PlanStep) -> StepResult {
    debug!(action = %step.action, "executing step");

    let mut parts = step.action.split_whitespace();
    let program = match parts.next() {
        Some(p) => p,
        None => {
            return StepResult::failure(step.clone(), -1, String::new(), "empty command".into())
        }
    };
    let args: Vec<&str> = parts.collect();

    match Command::new(program).args(&args).output() {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let exit_code = output.status.code().unwrap_or(-1);
            let success = output.status.success();

            if success {
                StepResult::success(step.clone(), exit_code, stdout, stderr)
            } else {
                if output.status.code().is_none() {
                    warn!(action = %step.action, "step terminated by signal");
                }
                StepResult::failure(step.clone(), exit_code, stdout, stderr)
            }
        }
        Err(err) => {
            warn!(action = %step.action, error = %err, "step failed to spawn");
            StepResult::failure(step.clone(), -1, String::new(), err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(action: &str) -> PlanStep {
        PlanStep {
            action: action.into(),
            reason: "test".into(),
        }
    }

    #[test]
    fn empty_steps_produce_empty_result() {
        let result = execute_steps(&[]);
        assert!(result.results.is_empty());
        assert_eq!(result.failed_at_step, -1);
    }

    #[test]
    fn runs_steps_in_order_and_stops_at_first_failure() {
        let steps = vec![
            step("true"),
            step("false"),
            step("true"),
        ];
        let result = execute_steps(&steps);
        assert_eq!(result.results.len(), 2);
        assert_eq!(result.failed_at_step, 1);
        assert_eq!(result.results[0].status, crate::types::StepStatus::Success);
        assert_eq!(result.results[1].status, crate::types::StepStatus::Failure);
    }

    #[test]
    fn all_success_yields_no_failure_index() {
        let steps = vec![step("true"), step("true")];
        let result = execute_steps(&steps);
        assert!(result.succeeded());
        assert_eq!(result.results.len(), 2);
    }

    #[test]
    fn missing_binary_surfaces_as_failure_not_panic() {
        let steps = vec![step("this-binary-does-not-exist-anywhere")];
        let result = execute_steps(&steps);
        assert_eq!(result.failed_at_step, 0);
        assert_eq!(result.results[0].exit_code, -1);
    }
}
