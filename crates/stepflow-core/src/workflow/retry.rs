//! Error policy for failed top-level steps.
//!
//! Stateless: all logic is in associated functions that read the step's
//! `on_error` and `retry_count`. Attempts are re-run sequentially with
//! identical inputs; only the final attempt's result is kept.

use stepflow_types::workflow::{OnError, WorkflowStep};

/// Retry budget used when `on_error: retry` is set without `retry_count`.
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// What the coordinator should do after a step attempt fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureAction {
    /// Run the step again.
    Retry,
    /// Record the failure and continue with the next step.
    Skip,
    /// Fail the run with this message and stop.
    Fail(String),
}

/// Stateless retry handler for workflow step failures.
pub struct RetryHandler;

impl RetryHandler {
    /// Additional attempts allowed after the first failure.
    pub fn retry_budget(step: &WorkflowStep) -> u32 {
        match step.on_error {
            OnError::Retry => step.retry_count.unwrap_or(DEFAULT_RETRY_COUNT),
            OnError::Fail | OnError::Skip => 0,
        }
    }

    /// Whether another attempt is allowed after `retries_used` retries.
    pub fn should_retry(step: &WorkflowStep, retries_used: u32) -> bool {
        step.on_error == OnError::Retry && retries_used < Self::retry_budget(step)
    }

    /// Decide how to handle a failed attempt.
    pub fn on_failure(step: &WorkflowStep, retries_used: u32, error: &str) -> FailureAction {
        match step.on_error {
            OnError::Skip => FailureAction::Skip,
            OnError::Retry if Self::should_retry(step, retries_used) => FailureAction::Retry,
            OnError::Retry => {
                FailureAction::Fail(Self::exhausted_message(&step.id, Self::retry_budget(step)))
            }
            OnError::Fail => FailureAction::Fail(Self::failure_message(&step.id, error)),
        }
    }

    /// Run-level error once the retry budget is spent.
    pub fn exhausted_message(step_id: &str, retries: u32) -> String {
        format!("Step {step_id} failed after {retries} retries")
    }

    /// Run-level error for a step failing under the default policy.
    pub fn failure_message(step_id: &str, error: &str) -> String {
        format!("Step {step_id} failed: {error}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(on_error: &str, retry_count: Option<u32>) -> WorkflowStep {
        serde_json::from_value(json!({
            "id": "fetch",
            "type": "delay",
            "config": { "type": "delay", "ms": 1 },
            "on_error": on_error,
            "retry_count": retry_count,
        }))
        .unwrap()
    }

    #[test]
    fn test_retry_budget() {
        assert_eq!(RetryHandler::retry_budget(&step("retry", Some(2))), 2);
        assert_eq!(RetryHandler::retry_budget(&step("retry", None)), DEFAULT_RETRY_COUNT);
        assert_eq!(RetryHandler::retry_budget(&step("fail", Some(5))), 0);
        assert_eq!(RetryHandler::retry_budget(&step("skip", Some(5))), 0);
    }

    #[test]
    fn test_should_retry_within_budget() {
        let s = step("retry", Some(2));
        assert!(RetryHandler::should_retry(&s, 0));
        assert!(RetryHandler::should_retry(&s, 1));
        assert!(!RetryHandler::should_retry(&s, 2));
    }

    #[test]
    fn test_on_failure_retry_then_exhausted() {
        let s = step("retry", Some(2));
        assert_eq!(RetryHandler::on_failure(&s, 1, "boom"), FailureAction::Retry);
        assert_eq!(
            RetryHandler::on_failure(&s, 2, "boom"),
            FailureAction::Fail("Step fetch failed after 2 retries".to_string())
        );
    }

    #[test]
    fn test_on_failure_zero_retries() {
        let s = step("retry", Some(0));
        assert_eq!(
            RetryHandler::on_failure(&s, 0, "boom"),
            FailureAction::Fail("Step fetch failed after 0 retries".to_string())
        );
    }

    #[test]
    fn test_on_failure_skip_and_fail() {
        assert_eq!(
            RetryHandler::on_failure(&step("skip", None), 0, "boom"),
            FailureAction::Skip
        );
        assert_eq!(
            RetryHandler::on_failure(&step("fail", None), 0, "connection refused"),
            FailureAction::Fail("Step fetch failed: connection refused".to_string())
        );
    }
}
