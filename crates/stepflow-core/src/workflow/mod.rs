//! Workflow engine core: definition handling, single-pass execution, and the
//! public engine façade.
//!
//! - `resolver` -- `{{name}}` placeholder resolution for tool parameters
//! - `expression` -- JEXL evaluator for transform and condition steps
//! - `gate` -- dependency gate plus cycle and ordering checks
//! - `definition` -- YAML parsing, validation, filesystem load/save
//! - `retry` -- `on_error` policy for failed steps
//! - `tool` / `audit` -- injected collaborator traits
//! - `step_runner` -- step type handlers
//! - `coordinator` -- run lifecycle
//! - `engine` -- definition registry, run table, cancellation

pub mod audit;
pub mod coordinator;
pub mod definition;
pub mod engine;
pub mod expression;
pub mod gate;
pub mod resolver;
pub mod retry;
pub mod step_runner;
pub mod tool;

pub use audit::{AuditEntry, AuditLogger, NoopAuditLogger};
pub use engine::{EngineError, WorkflowEngine};
pub use tool::{ToolFuture, ToolRegistry, ToolResult};
