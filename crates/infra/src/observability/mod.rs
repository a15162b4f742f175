//! Observability infrastructure
//!
//! Installs the process-wide `tracing` subscriber. Library crates only emit
//! events; binaries call [`init_tracing`] once at startup.

pub mod logging;

pub use logging::{init_tracing, init_tracing_with, LogFormat, DEFAULT_FILTER, LOG_JSON_VAR};
