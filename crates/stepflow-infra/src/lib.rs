//! Infrastructure layer for Stepflow.
//!
//! Concrete pieces around the engine in `stepflow-core`: TOML configuration
//! loading, audit logger implementations, and a bootstrap helper that turns a
//! data directory into a ready `WorkflowEngine`.

pub mod audit;
pub mod bootstrap;
pub mod config;
