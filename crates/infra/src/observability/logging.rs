//! Subscriber setup
//!
//! The filter comes from `RUST_LOG` and defaults to [`DEFAULT_FILTER`].
//! Setting `RPCSHIELD_LOG_JSON=true` switches the output to one JSON object
//! per event.

use rpcshield_domain::{Result, RpcShieldError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::loader::env_bool;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Variable selecting JSON output.
pub const LOG_JSON_VAR: &str = "RPCSHIELD_LOG_JSON";

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// `Json` when the JSON variable is truthy, `Pretty` otherwise.
    pub fn from_env() -> Self {
        if env_bool(LOG_JSON_VAR, false) {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Install the global subscriber using the format chosen by the environment.
///
/// # Errors
/// Returns `RpcShieldError::Config` if a global subscriber is already set.
pub fn init_tracing() -> Result<()> {
    init_tracing_with(LogFormat::from_env())
}

/// Install the global subscriber with an explicit format.
///
/// # Errors
/// Returns `RpcShieldError::Config` if a global subscriber is already set.
pub fn init_tracing_with(format: LogFormat) -> Result<()> {
    let registry = tracing_subscriber::registry().with(build_env_filter());
    let installed = match format {
        LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().with_target(false)).try_init(),
    };
    installed.map_err(|e| {
        RpcShieldError::Config(format!("failed to install tracing subscriber: {e}"))
    })
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
