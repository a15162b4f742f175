//! Configuration structures
//!
//! Durations are written in milliseconds in both TOML and JSON files
//! (`refill_interval_ms = 1000`). Every section has a default and a
//! `validate` method called by the loader.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

use crate::constants::{DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_SERVER_ADDR, DEFAULT_STORAGE_URI};
use crate::errors::{Result, RpcShieldError};
use crate::outcome::FailureKind;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// RPC client section.
    pub client: ClientConfig,
    /// Record store section.
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.client.validate()?;
        self.storage.validate()
    }
}

/// Connection and resilience settings for the RPC client.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `host:port` of the peer.
    pub server_addr: String,
    /// Largest encoded outbound message, in bytes.
    pub max_message_size: usize,
    /// Time allowed to establish the transport.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "connect_timeout_ms")]
    pub connect_timeout: Duration,
    /// Upper bound on every unary call, retries included. Callers may
    /// tighten it per call.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "call_timeout_ms")]
    pub call_timeout: Duration,
    /// Transport security.
    pub tls: TlsConfig,
    /// Per-endpoint admission control.
    pub rate_limit: RateLimitSettings,
    /// Per-endpoint breaker thresholds.
    pub circuit_breaker: BreakerSettings,
    /// Retry policy for unary calls.
    pub retry: RetrySettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: DEFAULT_SERVER_ADDR.to_string(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            connect_timeout: Duration::from_secs(3),
            call_timeout: Duration::from_secs(30),
            tls: TlsConfig::default(),
            rate_limit: RateLimitSettings::default(),
            circuit_breaker: BreakerSettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl ClientConfig {
    /// Reject empty addresses, zero sizes or timeouts, and invalid subsections.
    pub fn validate(&self) -> Result<()> {
        if self.server_addr.trim().is_empty() {
            return Err(RpcShieldError::Config("server_addr must not be empty".into()));
        }
        if self.max_message_size == 0 {
            return Err(RpcShieldError::Config("max_message_size must be greater than 0".into()));
        }
        if self.connect_timeout.is_zero() {
            return Err(RpcShieldError::Config("connect_timeout must be greater than 0".into()));
        }
        if self.call_timeout.is_zero() {
            return Err(RpcShieldError::Config("call_timeout must be greater than 0".into()));
        }
        self.tls.validate()?;
        self.rate_limit.validate()?;
        self.circuit_breaker.validate()?;
        self.retry.validate()
    }
}

/// Transport security switch. Certificate handling belongs to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Whether to use TLS at all.
    pub enabled: bool,
    /// CA bundle; required when `enabled`.
    pub ca_cert_path: Option<String>,
}

impl TlsConfig {
    /// Require a CA path when TLS is on.
    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.ca_cert_path.as_deref().map_or(true, str::is_empty) {
            return Err(RpcShieldError::Config(
                "tls.ca_cert_path is required when tls is enabled".into(),
            ));
        }
        Ok(())
    }
}

/// Token bucket shared by every invocation of one endpoint.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Burst size.
    pub capacity: u64,
    /// Tokens added per interval.
    pub refill_amount: u64,
    /// Time between refills.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "refill_interval_ms")]
    pub refill_interval: Duration,
}

impl Default for RateLimitSettings {
    /// Burst of 100, one token per second.
    fn default() -> Self {
        Self { capacity: 100, refill_amount: 1, refill_interval: Duration::from_secs(1) }
    }
}

impl RateLimitSettings {
    /// Every field must be non-zero.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 || self.refill_amount == 0 || self.refill_interval.is_zero() {
            return Err(RpcShieldError::Config(
                "rate_limit capacity, refill_amount and refill_interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Circuit breaker thresholds.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// Consecutive failures that trip the breaker.
    pub failure_threshold: u64,
    /// Optional window the consecutive failures must fall within.
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    #[serde(rename = "failure_window_ms")]
    pub failure_window: Option<Duration>,
    /// Time spent open before a single trial call is let through.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "cool_down_ms")]
    pub cool_down: Duration,
}

impl Default for BreakerSettings {
    /// Trips on the sixth consecutive failure and cools down for 30 seconds.
    fn default() -> Self {
        Self { failure_threshold: 6, failure_window: None, cool_down: Duration::from_secs(30) }
    }
}

impl BreakerSettings {
    /// Threshold and window, when set, must be non-zero.
    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(RpcShieldError::Config(
                "circuit_breaker.failure_threshold must be greater than 0".into(),
            ));
        }
        if self.failure_window.is_some_and(|w| w.is_zero()) {
            return Err(RpcShieldError::Config(
                "circuit_breaker.failure_window must be greater than 0 when set".into(),
            ));
        }
        Ok(())
    }
}

/// Retry policy.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Delay between attempts before jitter.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "base_delay_ms")]
    pub base_delay: Duration,
    /// Spread applied to `base_delay`, within `[0.0, 1.0]`.
    pub jitter_fraction: f64,
    /// Total attempts, first attempt included.
    pub max_attempts: u32,
    /// Failure kinds worth another attempt.
    pub retryable_kinds: BTreeSet<FailureKind>,
}

impl Default for RetrySettings {
    /// 900ms..1100ms between attempts, retrying `NotFound` and `Aborted`.
    ///
    /// A missing entity rarely appears on its own, so retrying `NotFound` is
    /// usually wasted; drop it from `retryable_kinds` where that matters.
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            jitter_fraction: 0.1,
            max_attempts: 3,
            retryable_kinds: BTreeSet::from([FailureKind::NotFound, FailureKind::Aborted]),
        }
    }
}

impl RetrySettings {
    /// At least one attempt and a jitter fraction within range.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(RpcShieldError::Config("retry.max_attempts must be greater than 0".into()));
        }
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err(RpcShieldError::Config(
                "retry.jitter_fraction must be within [0.0, 1.0]".into(),
            ));
        }
        Ok(())
    }
}

/// Location of the external record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Store URI, e.g. `memory://`.
    pub uri: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { uri: DEFAULT_STORAGE_URI.to_string() }
    }
}

impl StorageConfig {
    /// The URI must carry a scheme.
    pub fn validate(&self) -> Result<()> {
        if !self.uri.contains("://") {
            return Err(RpcShieldError::Config(format!(
                "storage.uri must be a URI, got {:?}",
                self.uri
            )));
        }
        Ok(())
    }
}
