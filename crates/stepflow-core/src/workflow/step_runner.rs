//! Step runner for the five workflow step types.
//!
//! `StepRunner` dispatches a step to the handler for its `StepConfig`
//! variant and always produces a `StepResult`. Handler errors, tool
//! failures, cancellation and panics are all captured as a `failed` result;
//! nothing escapes `run`.
//!
//! Parallel and condition steps recurse into their nested steps. Condition
//! branches run in sequence against the live run; parallel members run
//! concurrently, each against its own snapshot of the run.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, join_all};
use serde_json::Value;
use stepflow_types::workflow::{
    ConditionOutcome, StepConfig, StepResult, StepType, WorkflowDefinition, WorkflowRun,
    WorkflowStep,
};
use tokio_util::sync::CancellationToken;

use super::expression::{ExpressionError, WorkflowEvaluator, expression_context};
use super::gate::DependencyGate;
use super::resolver::VariableResolver;
use super::tool::ToolRegistry;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Error recorded on a step skipped by the dependency gate.
pub const DEPENDENCIES_NOT_MET: &str = "Dependencies not met";

/// Error recorded on a step interrupted by cancellation.
pub const CANCELLED: &str = "cancelled";

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

/// Errors raised inside a step handler. Always converted into a failed
/// `StepResult`.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// The `config` variant does not match the declared `type`.
    #[error("step '{step_id}' is declared as '{declared}' but carries a '{actual}' config")]
    StepType {
        step_id: String,
        declared: StepType,
        actual: StepType,
    },

    /// The tool registry reported `success: false`.
    #[error("{message}")]
    ToolExecution { tool: String, message: String },

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    /// A nested step ID that is not in the definition.
    #[error("unknown step '{0}'")]
    UnknownStep(String),

    #[error("cancelled")]
    Cancelled,

    #[error("step panicked: {0}")]
    Panicked(String),

    /// Step output could not be serialized.
    #[error("invalid step output: {0}")]
    Output(String),
}

// ---------------------------------------------------------------------------
// ExecutionScope
// ---------------------------------------------------------------------------

/// Mutable run state a step executes against.
pub struct ExecutionScope<'r> {
    pub definition: &'r WorkflowDefinition,
    pub run: &'r mut WorkflowRun,
    /// Steps executed so far in the current pass.
    pub executed: &'r mut HashSet<String>,
    pub cancel: &'r CancellationToken,
}

// ---------------------------------------------------------------------------
// StepRunner
// ---------------------------------------------------------------------------

/// Executes individual workflow steps by dispatching to type-specific handlers.
pub struct StepRunner {
    tools: Arc<dyn ToolRegistry>,
    delay_cap_ms: u64,
}

impl StepRunner {
    /// `delay_cap_ms` bounds every delay step.
    pub fn new(tools: Arc<dyn ToolRegistry>, delay_cap_ms: u64) -> Self {
        Self {
            tools,
            delay_cap_ms,
        }
    }

    pub fn delay_cap_ms(&self) -> u64 {
        self.delay_cap_ms
    }

    /// Execute one step and report its outcome.
    ///
    /// The result is not recorded into `scope.run`; that is the caller's
    /// job. Nested condition branch steps are the exception and are recorded
    /// as they finish.
    pub fn run<'a, 'r: 'a>(
        &'a self,
        step: &'a WorkflowStep,
        scope: &'a mut ExecutionScope<'r>,
    ) -> BoxFuture<'a, StepResult> {
        Box::pin(async move {
            let started_at = Utc::now();
            if scope.cancel.is_cancelled() {
                return StepResult::failed(&step.id, CANCELLED, started_at);
            }

            tracing::debug!(
                run_id = %scope.run.id,
                step_id = %step.id,
                step_type = %step.step_type,
                "dispatching step"
            );

            let outcome = AssertUnwindSafe(self.dispatch(step, scope))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(data)) => StepResult::completed(&step.id, data, started_at),
                Ok(Err(err)) => {
                    tracing::warn!(
                        run_id = %scope.run.id,
                        step_id = %step.id,
                        error = %err,
                        "step failed"
                    );
                    StepResult::failed(&step.id, err.to_string(), started_at)
                }
                Err(panic) => {
                    let err = StepError::Panicked(panic_message(panic.as_ref()));
                    tracing::warn!(
                        run_id = %scope.run.id,
                        step_id = %step.id,
                        error = %err,
                        "step panicked"
                    );
                    StepResult::failed(&step.id, err.to_string(), started_at)
                }
            }
        })
    }

    async fn dispatch(
        &self,
        step: &WorkflowStep,
        scope: &mut ExecutionScope<'_>,
    ) -> Result<Option<Value>, StepError> {
        let actual = step.config.step_type();
        if actual != step.step_type {
            return Err(StepError::StepType {
                step_id: step.id.clone(),
                declared: step.step_type,
                actual,
            });
        }

        match &step.config {
            StepConfig::Tool { tool_name, params } => {
                self.run_tool(tool_name, params, scope).await
            }
            StepConfig::Delay { ms } => self.run_delay(*ms, scope.cancel).await,
            StepConfig::Transform { code } => run_transform(code, scope.run),
            StepConfig::Parallel { step_ids } => self.run_parallel(step_ids, scope).await,
            StepConfig::Condition {
                expression,
                then_steps,
                else_steps,
            } => {
                self.run_condition(&step.id, expression, then_steps, else_steps, scope)
                    .await
            }
        }
    }

    async fn run_tool(
        &self,
        tool_name: &str,
        params: &HashMap<String, Value>,
        scope: &mut ExecutionScope<'_>,
    ) -> Result<Option<Value>, StepError> {
        let resolved = VariableResolver::resolve(params, &scope.run.variables);

        let result = tokio::select! {
            result = self.tools.execute(tool_name, resolved) => result,
            _ = scope.cancel.cancelled() => return Err(StepError::Cancelled),
        };

        if result.success {
            Ok(result.data)
        } else {
            Err(StepError::ToolExecution {
                tool: tool_name.to_string(),
                message: result
                    .error
                    .unwrap_or_else(|| format!("tool '{tool_name}' failed")),
            })
        }
    }

    async fn run_delay(&self, ms: u64, cancel: &CancellationToken) -> Result<Option<Value>, StepError> {
        let capped = ms.min(self.delay_cap_ms);
        if capped < ms {
            tracing::debug!(requested_ms = ms, capped_ms = capped, "delay clamped");
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(capped)) => Ok(None),
            _ = cancel.cancelled() => Err(StepError::Cancelled),
        }
    }

    /// Fan out to every member concurrently and wait for all of them.
    ///
    /// Member failures are reported in the output array; the parallel step
    /// itself completes unless it is cancelled.
    async fn run_parallel(
        &self,
        step_ids: &[String],
        scope: &mut ExecutionScope<'_>,
    ) -> Result<Option<Value>, StepError> {
        let definition = scope.definition;
        let cancel = scope.cancel;
        let snapshot = scope.run.clone();
        let executed = scope.executed.clone();

        let members = step_ids.iter().map(|id| {
            let mut run = snapshot.clone();
            let mut executed = executed.clone();
            async move {
                let Some(member) = definition.step(id) else {
                    let err = StepError::UnknownStep(id.clone());
                    return StepResult::failed(id, err.to_string(), Utc::now());
                };
                let mut child = ExecutionScope {
                    definition,
                    run: &mut run,
                    executed: &mut executed,
                    cancel,
                };
                self.run_nested(member, &mut child).await
            }
        });

        let results = tokio::select! {
            results = join_all(members) => results,
            _ = cancel.cancelled() => return Err(StepError::Cancelled),
        };

        let entries: Vec<_> = results.iter().map(StepResult::to_parallel_entry).collect();
        serde_json::to_value(entries)
            .map(Some)
            .map_err(|e| StepError::Output(e.to_string()))
    }

    /// Evaluate the expression, then run the selected branch in order.
    ///
    /// Branch step results are written into the run as they finish. A failed
    /// branch step does not fail the condition.
    async fn run_condition(
        &self,
        step_id: &str,
        expression: &str,
        then_steps: &[String],
        else_steps: &[String],
        scope: &mut ExecutionScope<'_>,
    ) -> Result<Option<Value>, StepError> {
        let condition = WorkflowEvaluator::new().evaluate_in_run(expression, scope.run)?;
        let outcome = ConditionOutcome::new(condition);
        let branch = if condition { then_steps } else { else_steps };

        tracing::debug!(
            run_id = %scope.run.id,
            step_id,
            condition,
            branch_len = branch.len(),
            "condition evaluated"
        );

        let definition = scope.definition;
        for id in branch {
            if scope.cancel.is_cancelled() {
                return Err(StepError::Cancelled);
            }
            let nested = definition
                .step(id)
                .ok_or_else(|| StepError::UnknownStep(id.clone()))?;

            let result = self.run_nested(nested, scope).await;
            if result.is_completed() {
                scope.executed.insert(result.step_id.clone());
            }
            scope.run.record(result);
        }

        Ok(Some(outcome.to_value()))
    }

    /// Run a nested step once, subject to the dependency gate.
    async fn run_nested(&self, step: &WorkflowStep, scope: &mut ExecutionScope<'_>) -> StepResult {
        if !DependencyGate::is_eligible(step, scope.executed) {
            tracing::debug!(step_id = %step.id, "nested step dependencies not met");
            return StepResult::skipped(&step.id, DEPENDENCIES_NOT_MET);
        }
        self.run(step, scope).await
    }
}

fn run_transform(code: &str, run: &WorkflowRun) -> Result<Option<Value>, StepError> {
    let value = WorkflowEvaluator::new().evaluate_transform(code, &expression_context(run))?;
    Ok(Some(value))
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
