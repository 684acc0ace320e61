//! Concrete audit loggers.
//!
//! - [`TracingAuditLogger`] writes each entry as a structured `tracing` event
//!   on the `stepflow::audit` target.
//! - [`BroadcastAuditLogger`] fans entries out to any number of subscribers
//!   over a `tokio::sync::broadcast` channel. Publishing with no active
//!   subscribers is a no-op.

use stepflow_core::workflow::{AuditEntry, AuditLogger};
use tokio::sync::broadcast;

/// Target used for audit events, so they can be filtered with `RUST_LOG`.
pub const AUDIT_TARGET: &str = "stepflow::audit";

// ---------------------------------------------------------------------------
// TracingAuditLogger
// ---------------------------------------------------------------------------

/// Emits audit entries as `info` events (`warn` for unsuccessful ones).
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditLogger;

impl AuditLogger for TracingAuditLogger {
    fn log(&self, entry: AuditEntry) {
        let details = entry.details.to_string();
        if entry.success {
            tracing::info!(
                target: AUDIT_TARGET,
                action = %entry.action,
                success = entry.success,
                details = %details,
                "audit"
            );
        } else {
            tracing::warn!(
                target: AUDIT_TARGET,
                action = %entry.action,
                success = entry.success,
                details = %details,
                "audit"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// BroadcastAuditLogger
// ---------------------------------------------------------------------------

/// Multi-consumer audit feed.
///
/// Cloning the logger clones the sender, so every clone publishes to the
/// same subscribers.
#[derive(Clone)]
pub struct BroadcastAuditLogger {
    sender: broadcast::Sender<AuditEntry>,
}

impl BroadcastAuditLogger {
    /// Create a logger whose channel buffers up to `capacity` entries per
    /// subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receive all entries published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AuditEntry> {
        self.sender.subscribe()
    }
}

impl AuditLogger for BroadcastAuditLogger {
    fn log(&self, entry: AuditEntry) {
        let _ = self.sender.send(entry);
    }
}

impl std::fmt::Debug for BroadcastAuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastAuditLogger")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(action: &str, success: bool) -> AuditEntry {
        AuditEntry {
            action: action.to_string(),
            details: json!({ "workflow_id": "wf" }),
            success,
        }
    }

    #[test]
    fn tracing_logger_accepts_entries_without_subscriber() {
        TracingAuditLogger.log(entry("workflow.start", true));
        TracingAuditLogger.log(entry("workflow.complete", false));
    }

    #[tokio::test]
    async fn broadcast_delivers_to_every_subscriber() {
        let logger = BroadcastAuditLogger::new(16);
        let mut first = logger.subscribe();
        let mut second = logger.subscribe();

        logger.log(entry("workflow.start", true));

        assert_eq!(first.recv().await.unwrap().action, "workflow.start");
        assert_eq!(second.recv().await.unwrap().action, "workflow.start");
    }

    #[test]
    fn broadcast_without_subscribers_is_noop() {
        let logger = BroadcastAuditLogger::new(4);
        logger.log(entry("workflow.start", true));
        assert!(format!("{logger:?}").contains("receiver_count: 0"));
    }

    #[tokio::test]
    async fn clones_share_subscribers() {
        let logger = BroadcastAuditLogger::new(4);
        let mut rx = logger.subscribe();
        let clone = logger.clone();

        clone.log(entry("workflow.complete", false));
        let received = rx.recv().await.unwrap();
        assert!(!received.success);
    }
}
