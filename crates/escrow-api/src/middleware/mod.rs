//! # HTTP Middleware
//!
//! - `metrics`: request, error and write-conflict counters.
//! - `tracing_layer`: `tower-http` request spans.

pub mod metrics;
pub mod tracing_layer;
