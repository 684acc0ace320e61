//! Engine bootstrap from a data directory.
//!
//! Loads `stepflow.toml`, builds a `WorkflowEngine` with the injected
//! collaborators, then discovers and registers every YAML definition under
//! the configured definitions directory. Files that fail to load or register
//! are reported, not fatal.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use stepflow_core::workflow::definition::scan_workflows;
use stepflow_core::workflow::{AuditLogger, ToolRegistry, WorkflowEngine};
use stepflow_types::config::EngineConfig;

use crate::config::{load_engine_config, resolve_definitions_dir};

/// A definition file that could not be loaded or registered.
#[derive(Debug, Clone)]
pub struct RejectedDefinition {
    pub path: PathBuf,
    pub error: String,
}

/// A ready engine plus what happened while loading definitions.
pub struct Bootstrap {
    pub engine: WorkflowEngine,
    pub config: EngineConfig,
    /// IDs of registered workflows, in discovery order.
    pub registered: Vec<String>,
    pub rejected: Vec<RejectedDefinition>,
}

/// Build an engine from `{data_dir}/stepflow.toml` and its definitions directory.
///
/// Errors only when the definitions directory exists but cannot be scanned.
pub async fn build_engine(
    data_dir: &Path,
    tools: Arc<dyn ToolRegistry>,
    audit: Arc<dyn AuditLogger>,
) -> anyhow::Result<Bootstrap> {
    let config = load_engine_config(data_dir).await;
    let engine = WorkflowEngine::with_config(tools, audit, config.clone());

    let mut registered = Vec::new();
    let mut rejected = Vec::new();

    if let Some(dir) = resolve_definitions_dir(&config, data_dir) {
        let scan_dir = dir.clone();
        let scan = tokio::task::spawn_blocking(move || scan_workflows(&scan_dir))
            .await
            .context("definition discovery task failed")?
            .with_context(|| format!("failed to scan {}", dir.display()))?;

        for (path, error) in scan.invalid {
            tracing::warn!(path = %path.display(), error = %error, "invalid workflow file");
            rejected.push(RejectedDefinition {
                path,
                error: error.to_string(),
            });
        }

        for (path, definition) in scan.definitions {
            let id = definition.id.clone();
            match engine.register(definition) {
                Ok(_) => registered.push(id),
                Err(err) => {
                    tracing::warn!(path = %path.display(), workflow_id = %id, error = %err, "rejected workflow definition");
                    rejected.push(RejectedDefinition {
                        path,
                        error: err.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            dir = %dir.display(),
            registered = registered.len(),
            rejected = rejected.len(),
            "workflow definitions loaded"
        );
    }

    Ok(Bootstrap {
        engine,
        config,
        registered,
        rejected,
    })
}
