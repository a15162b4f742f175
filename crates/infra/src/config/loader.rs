//! Configuration loader
//!
//! Loads [`AppConfig`] from environment variables or files.
//!
//! ## Loading Strategy
//! 1. If `RPCSHIELD_SERVER_ADDR` is set, the environment is authoritative:
//!    every other variable is optional and falls back to its default
//! 2. Otherwise searches for a config file (JSON or TOML)
//! 3. Otherwise uses the built-in defaults
//!
//! Whatever the source, the result is validated before it is returned.
//!
//! ## Environment Variables
//! - `RPCSHIELD_SERVER_ADDR`: `host:port` of the RPC server
//! - `RPCSHIELD_MAX_MESSAGE_SIZE`: outbound message limit in bytes
//! - `RPCSHIELD_CONNECT_TIMEOUT_MS`: connection timeout
//! - `RPCSHIELD_CALL_TIMEOUT_MS`: upper bound on each unary call
//! - `RPCSHIELD_TLS_ENABLED`: whether to use TLS (true/false)
//! - `RPCSHIELD_TLS_CA_CERT`: CA certificate path
//! - `RPCSHIELD_RATE_LIMIT_CAPACITY`: token bucket burst size
//! - `RPCSHIELD_RATE_LIMIT_REFILL_AMOUNT`: tokens added per interval
//! - `RPCSHIELD_RATE_LIMIT_REFILL_INTERVAL_MS`: refill interval
//! - `RPCSHIELD_BREAKER_FAILURE_THRESHOLD`: consecutive failures that trip
//! - `RPCSHIELD_BREAKER_FAILURE_WINDOW_MS`: window for those failures
//! - `RPCSHIELD_BREAKER_COOL_DOWN_MS`: open-state duration
//! - `RPCSHIELD_RETRY_BASE_DELAY_MS`: backoff base delay
//! - `RPCSHIELD_RETRY_JITTER`: jitter fraction in `[0, 1]`
//! - `RPCSHIELD_RETRY_MAX_ATTEMPTS`: total attempts
//! - `RPCSHIELD_RETRY_KINDS`: comma-separated retryable failure kinds
//! - `RPCSHIELD_STORAGE_URI`: record store location
//!
//! ## File Locations
//! The loader looks for `rpcshield.{toml,json}` then `config.{toml,json}` in the
//! current working directory and each of its parents, nearest first.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rpcshield_domain::{AppConfig, FailureKind, Result, RpcShieldError};
use tracing::{debug, info};

/// Variable that switches the loader to environment mode.
pub const SERVER_ADDR_VAR: &str = "RPCSHIELD_SERVER_ADDR";

const FILE_NAMES: [&str; 4] = ["rpcshield.toml", "rpcshield.json", "config.toml", "config.json"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `RpcShieldError::Config` if the chosen source is malformed or the
/// resulting configuration fails validation.
pub fn load() -> Result<AppConfig> {
    if std::env::var_os(SERVER_ADDR_VAR).is_some() {
        let config = load_from_env()?;
        info!("Configuration loaded from environment variables");
        return Ok(config);
    }

    match discover_config_paths() {
        Some(path) => load_from_file(Some(path)),
        None => {
            info!("No configuration found, using defaults");
            let config = AppConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Load configuration from environment variables
///
/// `RPCSHIELD_SERVER_ADDR` is required; see the module documentation for
/// the optional variables.
///
/// # Errors
/// Returns `RpcShieldError::Config` if the server address is missing or any
/// variable has an invalid value.
pub fn load_from_env() -> Result<AppConfig> {
    let mut config = AppConfig::default();
    let client = &mut config.client;

    client.server_addr = env_var(SERVER_ADDR_VAR)?;
    if let Some(size) = env_parse("RPCSHIELD_MAX_MESSAGE_SIZE")? {
        client.max_message_size = size;
    }
    if let Some(timeout) = env_millis("RPCSHIELD_CONNECT_TIMEOUT_MS")? {
        client.connect_timeout = timeout;
    }
    if let Some(timeout) = env_millis("RPCSHIELD_CALL_TIMEOUT_MS")? {
        client.call_timeout = timeout;
    }

    client.tls.enabled = env_bool("RPCSHIELD_TLS_ENABLED", client.tls.enabled);
    if let Ok(path) = std::env::var("RPCSHIELD_TLS_CA_CERT") {
        client.tls.ca_cert_path = Some(path);
    }

    let rate = &mut client.rate_limit;
    if let Some(capacity) = env_parse("RPCSHIELD_RATE_LIMIT_CAPACITY")? {
        rate.capacity = capacity;
    }
    if let Some(amount) = env_parse("RPCSHIELD_RATE_LIMIT_REFILL_AMOUNT")? {
        rate.refill_amount = amount;
    }
    if let Some(interval) = env_millis("RPCSHIELD_RATE_LIMIT_REFILL_INTERVAL_MS")? {
        rate.refill_interval = interval;
    }

    let breaker = &mut client.circuit_breaker;
    if let Some(threshold) = env_parse("RPCSHIELD_BREAKER_FAILURE_THRESHOLD")? {
        breaker.failure_threshold = threshold;
    }
    if let Some(window) = env_millis("RPCSHIELD_BREAKER_FAILURE_WINDOW_MS")? {
        breaker.failure_window = Some(window);
    }
    if let Some(cool_down) = env_millis("RPCSHIELD_BREAKER_COOL_DOWN_MS")? {
        breaker.cool_down = cool_down;
    }

    let retry = &mut client.retry;
    if let Some(delay) = env_millis("RPCSHIELD_RETRY_BASE_DELAY_MS")? {
        retry.base_delay = delay;
    }
    if let Some(jitter) = env_parse("RPCSHIELD_RETRY_JITTER")? {
        retry.jitter_fraction = jitter;
    }
    if let Some(attempts) = env_parse("RPCSHIELD_RETRY_MAX_ATTEMPTS")? {
        retry.max_attempts = attempts;
    }
    if let Ok(kinds) = std::env::var("RPCSHIELD_RETRY_KINDS") {
        retry.retryable_kinds = kinds
            .split(',')
            .map(str::trim)
            .filter(|kind| !kind.is_empty())
            .map(|kind| {
                FailureKind::from_str(kind).map_err(|e| {
                    RpcShieldError::Config(format!("Invalid RPCSHIELD_RETRY_KINDS: {e}"))
                })
            })
            .collect::<Result<_>>()?;
    }

    if let Ok(uri) = std::env::var("RPCSHIELD_STORAGE_URI") {
        config.storage.uri = uri;
    }

    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, searches for a config file with
/// [`discover_config_paths`]. The format is detected by file extension.
///
/// # Errors
/// Returns `RpcShieldError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - The configuration fails validation
pub fn load_from_file(path: Option<PathBuf>) -> Result<AppConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(RpcShieldError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => discover_config_paths().ok_or_else(|| {
            RpcShieldError::Config("No config file found in any of the standard locations".into())
        })?,
    };

    info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| RpcShieldError::Config(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<AppConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| RpcShieldError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| RpcShieldError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(RpcShieldError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Search the working directory and its parents for a config file
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn discover_config_paths() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    discover_from(&cwd)
}

fn discover_from(start: &Path) -> Option<PathBuf> {
    let found = start
        .ancestors()
        .flat_map(|dir| FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file());
    debug!(found = ?found, start = %start.display(), "searched for config file");
    found
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        RpcShieldError::Config(format!("Missing required environment variable: {key}"))
    })
}

/// Parse an optional environment variable
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| RpcShieldError::Config(format!("Invalid {key}: {e}"))),
        Err(_) => Ok(None),
    }
}

fn env_millis(key: &str) -> Result<Option<Duration>> {
    Ok(env_parse::<u64>(key)?.map(Duration::from_millis))
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
pub(crate) fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
