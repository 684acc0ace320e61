//! Shared domain types for Stepflow.
//!
//! This crate contains the workflow definition and execution tracking types
//! used across the engine, plus the engine configuration schema.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono.

pub mod config;
pub mod workflow;
