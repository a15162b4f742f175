//! Circuit breaker
//!
//! A three-state machine guarding one logical endpoint:
//!
//! - **Closed**: calls pass; consecutive failures are counted (optionally only
//!   within a rolling window) and reaching `failure_threshold` opens the
//!   circuit. Any success resets the count.
//! - **Open**: calls are rejected without running; once `cool_down` has
//!   elapsed since opening, the next admission check moves to half-open.
//! - **HalfOpen**: exactly one trial call runs. Its success closes the
//!   circuit; its failure reopens it and restarts the cool-down.
//!
//! All state lives behind one mutex so every transition is atomic with respect
//! to concurrent callers. Admission hands out a [`CallPermit`]; verdicts are
//! reported through the permit, and a permit dropped without a verdict frees
//! its trial slot.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};

//==============================================================================
// Error Types
//==============================================================================

/// Simple configuration error for validation
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A setting is out of range
    #[error("Invalid configuration: {message}")]
    Invalid {
        /// What is wrong with the setting.
        message: String,
    },
}

/// Configuration result type using simple config errors
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Circuit is half-open, allowing a single trial request to test recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u64,
    /// Time to wait before transitioning from open to half-open
    pub cool_down: Duration,
    /// When set, failures further apart than this restart the count
    pub failure_window: Option<Duration>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down: Duration::from_secs(60),
            failure_window: None,
        }
    }
}

impl CircuitBreakerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "failure_threshold must be greater than 0".to_string(),
            });
        }

        if self.failure_window.is_some_and(|window| window.is_zero()) {
            return Err(ConfigError::Invalid {
                message: "failure_window must be greater than zero when set".to_string(),
            });
        }

        Ok(())
    }
}

/// Circuit breaker metrics for monitoring
#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    /// State at the time of the snapshot
    pub state: CircuitState,
    /// Failures counted towards the threshold
    pub consecutive_failures: u64,
    /// Calls admitted
    pub total_calls: u64,
    /// Calls rejected without running
    pub rejected_calls: u64,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    /// Bumped on every transition; verdicts from older generations are stale.
    generation: u64,
    consecutive_failures: u64,
    window_start: Option<Instant>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            generation: 0,
            consecutive_failures: 0,
            window_start: None,
            opened_at: None,
            trial_in_flight: false,
        }
    }
}

/// Generic circuit breaker implementation
///
/// Cloning is cheap and clones share state, so one breaker can serve every
/// concurrent invocation of an endpoint.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    name: Arc<str>,
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<BreakerState>>,
    total_calls: Arc<AtomicU64>,
    rejected_calls: Arc<AtomicU64>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &inner.state)
            .field("consecutive_failures", &inner.consecutive_failures)
            .finish()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            config: self.config.clone(),
            inner: Arc::clone(&self.inner),
            total_calls: Arc::clone(&self.total_calls),
            rejected_calls: Arc::clone(&self.rejected_calls),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a new circuit breaker with the given configuration using system
    /// clock
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a new circuit breaker with a custom clock (useful for testing)
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;

        Ok(Self {
            name: Arc::from("default"),
            config,
            inner: Arc::new(Mutex::new(BreakerState::new())),
            total_calls: Arc::new(AtomicU64::new(0)),
            rejected_calls: Arc::new(AtomicU64::new(0)),
            clock: Arc::new(clock),
        })
    }

    /// Attach the endpoint name used in log events.
    pub fn named(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Endpoint name used in log events.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn transition(&self, st: &mut BreakerState, to: CircuitState, now: Instant) {
        let from = st.state;
        st.state = to;
        st.generation = st.generation.wrapping_add(1);
        st.trial_in_flight = false;

        match to {
            CircuitState::Open => {
                st.opened_at = Some(now);
                warn!(
                    breaker = %self.name,
                    %from,
                    consecutive_failures = st.consecutive_failures,
                    "circuit breaker opened"
                );
            }
            CircuitState::HalfOpen => {
                debug!(breaker = %self.name, %from, "circuit breaker half-open");
            }
            CircuitState::Closed => {
                st.consecutive_failures = 0;
                st.window_start = None;
                st.opened_at = None;
                info!(breaker = %self.name, %from, "circuit breaker closed");
            }
        }
    }

    /// Apply time-driven transitions (Open -> HalfOpen after the cool-down).
    fn refresh(&self, st: &mut BreakerState, now: Instant) {
        if st.state == CircuitState::Open {
            let cooled = st
                .opened_at
                .map_or(true, |opened| now.saturating_duration_since(opened) >= self.config.cool_down);
            if cooled {
                self.transition(st, CircuitState::HalfOpen, now);
            }
        }
    }

    /// Ask for admission.
    ///
    /// Returns `None` when the circuit is open, or half-open with its trial
    /// already running. Never blocks.
    pub fn try_acquire(&self) -> Option<CallPermit<C>> {
        let now = self.clock.now();
        let mut st = self.inner.lock();
        self.refresh(&mut st, now);

        let trial = match st.state {
            CircuitState::Closed => false,
            CircuitState::HalfOpen if !st.trial_in_flight => {
                st.trial_in_flight = true;
                true
            }
            CircuitState::HalfOpen | CircuitState::Open => {
                self.rejected_calls.fetch_add(1, Ordering::Relaxed);
                debug!(breaker = %self.name, state = %st.state, "circuit breaker rejecting call");
                return None;
            }
        };

        self.total_calls.fetch_add(1, Ordering::Relaxed);
        Some(CallPermit {
            breaker: self.clone(),
            generation: st.generation,
            trial,
            resolved: false,
        })
    }

    fn on_success(&self, generation: u64) {
        let now = self.clock.now();
        let mut st = self.inner.lock();
        if st.generation != generation {
            debug!(breaker = %self.name, "ignoring stale success verdict");
            return;
        }

        match st.state {
            CircuitState::Closed => {
                st.consecutive_failures = 0;
                st.window_start = None;
            }
            CircuitState::HalfOpen => self.transition(&mut st, CircuitState::Closed, now),
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, generation: u64) {
        let now = self.clock.now();
        let mut st = self.inner.lock();
        if st.generation != generation {
            debug!(breaker = %self.name, "ignoring stale failure verdict");
            return;
        }

        match st.state {
            CircuitState::Closed => {
                if let (Some(window), Some(start)) = (self.config.failure_window, st.window_start) {
                    if now.saturating_duration_since(start) > window {
                        st.consecutive_failures = 0;
                    }
                }
                if st.consecutive_failures == 0 {
                    st.window_start = Some(now);
                }
                st.consecutive_failures += 1;
                if st.consecutive_failures >= self.config.failure_threshold {
                    self.transition(&mut st, CircuitState::Open, now);
                }
            }
            CircuitState::HalfOpen => {
                warn!(breaker = %self.name, "trial call failed");
                self.transition(&mut st, CircuitState::Open, now);
            }
            CircuitState::Open => {}
        }
    }

    fn on_abandon(&self, generation: u64, trial: bool) {
        if !trial {
            return;
        }
        let mut st = self.inner.lock();
        if st.generation == generation && st.state == CircuitState::HalfOpen {
            st.trial_in_flight = false;
            debug!(breaker = %self.name, "trial slot released without verdict");
        }
    }

    /// Current state, after applying any elapsed cool-down.
    pub fn state(&self) -> CircuitState {
        let now = self.clock.now();
        let mut st = self.inner.lock();
        self.refresh(&mut st, now);
        st.state
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let st = self.inner.lock();
        CircuitBreakerMetrics {
            state: st.state,
            consecutive_failures: st.consecutive_failures,
            total_calls: self.total_calls.load(Ordering::Acquire),
            rejected_calls: self.rejected_calls.load(Ordering::Acquire),
        }
    }
}

/// Admission ticket handed out by [`CircuitBreaker::try_acquire`].
///
/// Resolve it with [`record_success`](Self::record_success),
/// [`record_failure`](Self::record_failure) or [`release`](Self::release).
/// Dropping it unresolved behaves like `release`.
#[must_use = "a permit should be resolved with a verdict"]
pub struct CallPermit<C: Clock = SystemClock> {
    breaker: CircuitBreaker<C>,
    generation: u64,
    trial: bool,
    resolved: bool,
}

impl<C: Clock> CallPermit<C> {
    /// Whether this call is a half-open trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    /// The call succeeded.
    pub fn record_success(mut self) {
        self.resolved = true;
        self.breaker.on_success(self.generation);
    }

    /// The call failed in a way that counts against the peer.
    pub fn record_failure(mut self) {
        self.resolved = true;
        self.breaker.on_failure(self.generation);
    }

    /// Give the slot back without a verdict (e.g. the caller cancelled).
    pub fn release(mut self) {
        self.resolved = true;
        self.breaker.on_abandon(self.generation, self.trial);
    }
}

impl<C: Clock> Drop for CallPermit<C> {
    fn drop(&mut self) {
        if !self.resolved {
            self.breaker.on_abandon(self.generation, self.trial);
        }
    }
}

impl<C: Clock> fmt::Debug for CallPermit<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallPermit")
            .field("breaker", &self.breaker.name)
            .field("generation", &self.generation)
            .field("trial", &self.trial)
            .finish()
    }
}
