//! `WorkflowEngine`: the public façade.
//!
//! Holds the definition registry and the run table, both in `DashMap`s so
//! `register`, `execute` and run inspection may be called concurrently from
//! any number of tasks. Each `execute` call gets its own `WorkflowRun` and
//! its own `Arc` of the definition it started with; re-registering an ID
//! never affects runs already in flight.
//!
//! Steps run in a single pass in declaration order (see [`super::gate`]).
//! Registration rejects cyclic dependencies and, depending on
//! `EngineConfig::strict_dependency_order`, either rejects or warns about
//! dependencies declared after their dependents.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use stepflow_types::config::EngineConfig;
use stepflow_types::workflow::{RunSummary, WorkflowDefinition, WorkflowRun};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::audit::{AuditEntry, AuditLogger, log_best_effort};
use super::coordinator::{RUN_CANCELLED, RunCoordinator};
use super::definition::{WorkflowError, validate_definition};
use super::step_runner::StepRunner;
use super::tool::ToolRegistry;

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Errors returned by the engine façade.
///
/// Run failures are not errors: `execute` resolves with a `failed` run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("workflow run not found: {0}")]
    RunNotFound(Uuid),

    #[error("invalid workflow definition: {0}")]
    InvalidDefinition(#[from] WorkflowError),
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

pub struct WorkflowEngine {
    definitions: DashMap<String, Arc<WorkflowDefinition>>,
    runs: DashMap<Uuid, WorkflowRun>,
    /// Cancellation tokens for in-flight runs, keyed by run ID.
    cancellation_tokens: DashMap<Uuid, CancellationToken>,
    coordinator: RunCoordinator,
    audit: Arc<dyn AuditLogger>,
    config: EngineConfig,
}

impl WorkflowEngine {
    /// Create an engine with the default configuration.
    pub fn new(tools: Arc<dyn ToolRegistry>, audit: Arc<dyn AuditLogger>) -> Self {
        Self::with_config(tools, audit, EngineConfig::default())
    }

    pub fn with_config(
        tools: Arc<dyn ToolRegistry>,
        audit: Arc<dyn AuditLogger>,
        config: EngineConfig,
    ) -> Self {
        let runner = StepRunner::new(tools, config.effective_delay_cap_ms());
        Self {
            definitions: DashMap::new(),
            runs: DashMap::new(),
            cancellation_tokens: DashMap::new(),
            coordinator: RunCoordinator::new(runner),
            audit,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    /// Validate and register a definition, replacing any existing one with
    /// the same ID. Returns non-fatal validation warnings.
    pub fn register(&self, definition: WorkflowDefinition) -> Result<Vec<String>, EngineError> {
        let warnings = validate_definition(&definition, self.config.strict_dependency_order)?;
        for warning in &warnings {
            tracing::warn!(workflow_id = %definition.id, "{warning}");
        }

        let id = definition.id.clone();
        let steps = definition.steps.len();
        let replaced = self
            .definitions
            .insert(id.clone(), Arc::new(definition))
            .is_some();
        tracing::info!(workflow_id = %id, steps, replaced, "workflow registered");
        Ok(warnings)
    }

    /// Remove a definition. Runs already started are unaffected.
    pub fn unregister(&self, id: &str) -> Result<(), EngineError> {
        if self.definitions.remove(id).is_none() {
            return Err(EngineError::WorkflowNotFound(id.to_string()));
        }
        tracing::info!(workflow_id = %id, "workflow unregistered");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Arc<WorkflowDefinition>, EngineError> {
        self.definitions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| EngineError::WorkflowNotFound(id.to_string()))
    }

    /// All registered definitions, sorted by ID.
    pub fn list(&self) -> Vec<Arc<WorkflowDefinition>> {
        let mut defs: Vec<_> = self
            .definitions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        defs.sort_by(|a, b| a.id.cmp(&b.id));
        defs
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Execute a registered workflow to completion.
    ///
    /// Fails only when `id` is not registered; otherwise resolves with the
    /// terminal run, whether `completed` or `failed`.
    pub async fn execute(
        &self,
        id: &str,
        input: HashMap<String, Value>,
    ) -> Result<WorkflowRun, EngineError> {
        self.execute_with_cancel(id, input, CancellationToken::new())
            .await
    }

    /// Execute with a caller-supplied cancellation token.
    ///
    /// The run can also be cancelled through [`Self::cancel`] while it is in
    /// flight. Dropping the returned future before it resolves stores the
    /// run as `failed` with the cancellation message.
    pub async fn execute_with_cancel(
        &self,
        id: &str,
        input: HashMap<String, Value>,
        cancel: CancellationToken,
    ) -> Result<WorkflowRun, EngineError> {
        let definition = self.get(id)?;
        let run = WorkflowRun::start(&definition, input);
        let run_id = run.id;

        tracing::info!(
            run_id = %run_id,
            workflow_id = %definition.id,
            steps = definition.steps.len(),
            "workflow run started"
        );
        self.runs.insert(run_id, run.clone());
        self.cancellation_tokens.insert(run_id, cancel.clone());
        log_best_effort(self.audit.as_ref(), AuditEntry::run_started(&run));

        let guard = InFlightRun {
            engine: self,
            run_id,
            settled: false,
        };
        let run = self.coordinator.execute(&definition, run, &cancel).await;
        guard.settle(&run);

        Ok(run)
    }

    /// Request cancellation of an in-flight run.
    pub fn cancel(&self, run_id: Uuid) -> Result<(), EngineError> {
        let token = self
            .cancellation_tokens
            .get(&run_id)
            .map(|entry| entry.value().clone())
            .ok_or(EngineError::RunNotFound(run_id))?;
        token.cancel();
        tracing::info!(run_id = %run_id, "workflow run cancellation requested");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Snapshot of a run: `running` while in flight, final once terminal.
    pub fn get_run(&self, run_id: Uuid) -> Result<WorkflowRun, EngineError> {
        self.runs
            .get(&run_id)
            .map(|entry| entry.value().clone())
            .ok_or(EngineError::RunNotFound(run_id))
    }

    /// Run summaries ordered by start time, optionally for one workflow.
    pub fn list_runs(&self, workflow_id: Option<&str>) -> Vec<RunSummary> {
        let mut summaries: Vec<RunSummary> = self
            .runs
            .iter()
            .filter(|entry| workflow_id.is_none_or(|id| entry.value().workflow_id == id))
            .map(|entry| entry.value().summary())
            .collect();
        summaries.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.run_id.cmp(&b.run_id)));
        summaries
    }

    /// Drop a run from the table.
    pub fn remove_run(&self, run_id: Uuid) -> Result<WorkflowRun, EngineError> {
        self.runs
            .remove(&run_id)
            .map(|(_, run)| run)
            .ok_or(EngineError::RunNotFound(run_id))
    }

    /// Remove terminal runs that completed before `older_than`. Returns how
    /// many were removed.
    pub fn prune_runs(&self, older_than: DateTime<Utc>) -> usize {
        let before = self.runs.len();
        self.runs.retain(|_, run| {
            !(run.status.is_terminal() && run.completed_at.is_some_and(|at| at < older_than))
        });
        let removed = before.saturating_sub(self.runs.len());
        if removed > 0 {
            tracing::debug!(removed, "pruned workflow runs");
        }
        removed
    }
}

// ---------------------------------------------------------------------------
// InFlightRun
// ---------------------------------------------------------------------------

/// Bookkeeping for a run between its `running` snapshot and its final state.
///
/// If the `execute` future is dropped before the coordinator returns, the
/// stored run is failed as cancelled and its token is released.
struct InFlightRun<'e> {
    engine: &'e WorkflowEngine,
    run_id: Uuid,
    settled: bool,
}

impl InFlightRun<'_> {
    fn settle(mut self, run: &WorkflowRun) {
        self.settled = true;
        self.engine.cancellation_tokens.remove(&self.run_id);
        self.engine.runs.insert(self.run_id, run.clone());
        log_best_effort(self.engine.audit.as_ref(), AuditEntry::run_completed(run));
    }
}

impl Drop for InFlightRun<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Some((_, token)) = self.engine.cancellation_tokens.remove(&self.run_id) {
            token.cancel();
        }

        let abandoned = self.engine.runs.get_mut(&self.run_id).map(|mut entry| {
            entry.fail(RUN_CANCELLED);
            entry.finalize();
            entry.value().clone()
        });
        if let Some(run) = abandoned {
            tracing::warn!(run_id = %self.run_id, "workflow run dropped before completion");
            log_best_effort(self.engine.audit.as_ref(), AuditEntry::run_completed(&run));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
