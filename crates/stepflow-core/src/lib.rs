//! Workflow execution engine for Stepflow.
//!
//! Depends only on `stepflow-types`; side effects happen behind the
//! `ToolRegistry` and `AuditLogger` traits, which callers inject.

pub mod workflow;
