//! Run lifecycle: one linear pass over a definition's steps.
//!
//! For each top-level step, in declaration order:
//! 1. Stop if the run has been cancelled.
//! 2. Skip the step (`"Dependencies not met"`) if the dependency gate says no.
//! 3. Execute it, then apply its `on_error` policy to a failure.
//!
//! Steps owned by a parallel or condition step are executed only through
//! their owner and are passed over here. A panic anywhere in the pass fails
//! the run; timing is finalized either way.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use stepflow_types::workflow::{StepResult, WorkflowDefinition, WorkflowRun};
use tokio_util::sync::CancellationToken;

use super::gate::{self, DependencyGate};
use super::retry::{FailureAction, RetryHandler};
use super::step_runner::{DEPENDENCIES_NOT_MET, ExecutionScope, StepRunner, panic_message};

/// Run-level error for a cancelled run.
pub const RUN_CANCELLED: &str = "Workflow run cancelled";

/// Drives a single `WorkflowRun` from `running` to a terminal status.
pub struct RunCoordinator {
    runner: StepRunner,
}

impl RunCoordinator {
    pub fn new(runner: StepRunner) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &StepRunner {
        &self.runner
    }

    /// Execute `run` against `definition` and return it in a terminal state.
    pub async fn execute(
        &self,
        definition: &WorkflowDefinition,
        mut run: WorkflowRun,
        cancel: &CancellationToken,
    ) -> WorkflowRun {
        let pass = AssertUnwindSafe(self.walk(definition, &mut run, cancel))
            .catch_unwind()
            .await;
        if let Err(panic) = pass {
            let message = panic_message(panic.as_ref());
            tracing::error!(run_id = %run.id, error = %message, "workflow run panicked");
            run.fail(message);
        }

        run.finalize();
        tracing::info!(
            run_id = %run.id,
            workflow_id = %run.workflow_id,
            status = ?run.status,
            duration_ms = run.duration_ms.unwrap_or_default(),
            steps_completed = run.step_results.completed_count(),
            "workflow run finished"
        );
        run
    }

    async fn walk(
        &self,
        definition: &WorkflowDefinition,
        run: &mut WorkflowRun,
        cancel: &CancellationToken,
    ) {
        let nested = gate::nested_step_ids(definition);
        let mut executed: HashSet<String> = HashSet::new();

        for step in &definition.steps {
            if nested.contains(&step.id) {
                continue;
            }
            if cancel.is_cancelled() {
                run.fail(RUN_CANCELLED);
                return;
            }
            if !DependencyGate::is_eligible(step, &executed) {
                tracing::debug!(run_id = %run.id, step_id = %step.id, "dependencies not met");
                run.record(StepResult::skipped(&step.id, DEPENDENCIES_NOT_MET));
                continue;
            }

            let mut retries_used = 0;
            loop {
                let result = {
                    let mut scope = ExecutionScope {
                        definition,
                        run: &mut *run,
                        executed: &mut executed,
                        cancel,
                    };
                    self.runner.run(step, &mut scope).await
                };

                if result.is_completed() {
                    run.record(result);
                    executed.insert(step.id.clone());
                    break;
                }
                if cancel.is_cancelled() {
                    run.record(result);
                    run.fail(RUN_CANCELLED);
                    return;
                }

                let error = result.error.clone().unwrap_or_default();
                match RetryHandler::on_failure(step, retries_used, &error) {
                    FailureAction::Retry => {
                        retries_used += 1;
                        tracing::warn!(
                            run_id = %run.id,
                            step_id = %step.id,
                            attempt = retries_used + 1,
                            error = %error,
                            "retrying step"
                        );
                    }
                    FailureAction::Skip => {
                        tracing::warn!(
                            run_id = %run.id,
                            step_id = %step.id,
                            error = %error,
                            "step failed, continuing"
                        );
                        run.record(result);
                        executed.insert(step.id.clone());
                        break;
                    }
                    FailureAction::Fail(message) => {
                        run.record(result);
                        run.fail(message);
                        return;
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
