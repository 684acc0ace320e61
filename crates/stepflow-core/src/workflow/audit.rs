//! Audit logging seam.
//!
//! The engine emits one entry when a run starts and one when it finishes.
//! Logging is fire-and-forget: a misbehaving logger never changes a run's
//! outcome.

use std::panic::{AssertUnwindSafe, catch_unwind};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use stepflow_types::workflow::WorkflowRun;

/// Action recorded when a run starts.
pub const WORKFLOW_START: &str = "workflow.start";
/// Action recorded when a run reaches a terminal status.
pub const WORKFLOW_COMPLETE: &str = "workflow.complete";

/// A single audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: String,
    pub details: Value,
    pub success: bool,
}

impl AuditEntry {
    /// Entry for a run that has just been created.
    pub fn run_started(run: &WorkflowRun) -> Self {
        Self {
            action: WORKFLOW_START.to_string(),
            details: json!({
                "run_id": run.id,
                "workflow_id": run.workflow_id,
            }),
            success: true,
        }
    }

    /// Entry for a run that has reached a terminal status.
    pub fn run_completed(run: &WorkflowRun) -> Self {
        Self {
            action: WORKFLOW_COMPLETE.to_string(),
            details: json!({
                "run_id": run.id,
                "workflow_id": run.workflow_id,
                "status": run.status,
                "duration_ms": run.duration_ms,
                "error": run.error,
            }),
            success: run.error.is_none(),
        }
    }
}

/// Sink for audit entries, injected as `Arc<dyn AuditLogger>`.
pub trait AuditLogger: Send + Sync {
    fn log(&self, entry: AuditEntry);
}

/// Discards every entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditLogger;

impl AuditLogger for NoopAuditLogger {
    fn log(&self, _entry: AuditEntry) {}
}

/// Deliver `entry` to `logger`, containing any panic it raises.
pub fn log_best_effort(logger: &dyn AuditLogger, entry: AuditEntry) {
    let action = entry.action.clone();
    if catch_unwind(AssertUnwindSafe(|| logger.log(entry))).is_err() {
        tracing::warn!(%action, "audit logger panicked; entry dropped");
    }
}
