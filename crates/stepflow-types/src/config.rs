//! Engine configuration types for Stepflow.
//!
//! `EngineConfig` represents the `stepflow.toml` file that tunes the
//! workflow engine. All fields have defaults so an empty file is valid.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Upper bound for a single delay step, in milliseconds.
pub const MAX_DELAY_MS: u64 = 30_000;

/// Top-level configuration for the workflow engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Delay cap in milliseconds. Never effective above [`MAX_DELAY_MS`].
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Reject definitions whose `depends_on` names a step declared later.
    ///
    /// When false such definitions are accepted with a warning and the
    /// affected steps are skipped at run time.
    #[serde(default)]
    pub strict_dependency_order: bool,

    /// Directory scanned for YAML workflow definitions at bootstrap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definitions_dir: Option<PathBuf>,
}

fn default_max_delay_ms() -> u64 {
    MAX_DELAY_MS
}

impl EngineConfig {
    /// The delay cap actually enforced by the engine.
    pub fn effective_delay_cap_ms(&self) -> u64 {
        self.max_delay_ms.min(MAX_DELAY_MS)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_delay_ms: default_max_delay_ms(),
            strict_dependency_order: false,
            definitions_dir: None,
        }
    }
}
