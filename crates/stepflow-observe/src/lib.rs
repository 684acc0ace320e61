//! Observability setup for Stepflow: structured logging with optional
//! OpenTelemetry trace export.

pub mod tracing_setup;
