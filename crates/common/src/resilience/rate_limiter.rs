//! Token bucket rate limiter
//!
//! The bucket starts full. Every whole `refill_interval` that elapses adds
//! `refill_amount` tokens, capped at `capacity`. Admission takes one token or
//! fails immediately; it never waits.
//!
//! Refill and take happen under one lock, so concurrent callers can never
//! overdraw the bucket. Partial intervals carry over: `last_refill` only
//! advances by whole intervals.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::circuit_breaker::{ConfigError, ConfigResult};
use super::clock::{Clock, SystemClock};

/// Configuration for token bucket rate limiter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBucketConfig {
    /// Maximum number of tokens the bucket can hold
    pub capacity: u64,
    /// Number of tokens to refill per interval
    pub refill_amount: u64,
    /// Time interval for token refill
    pub refill_interval: Duration,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self { capacity: 100, refill_amount: 1, refill_interval: Duration::from_secs(1) }
    }
}

impl TokenBucketConfig {
    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        let message = if self.capacity == 0 {
            "capacity must be greater than 0"
        } else if self.refill_amount == 0 {
            "refill_amount must be greater than 0"
        } else if self.refill_interval.is_zero() {
            "refill_interval must be greater than zero"
        } else {
            return Ok(());
        };
        Err(ConfigError::Invalid { message: message.to_string() })
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: u64,
    last_refill: Instant,
}

/// Token bucket rate limiter
///
/// Clones share the same bucket.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use rpcshield_common::resilience::{TokenBucket, TokenBucketConfig};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = TokenBucketConfig {
///     capacity: 2,
///     refill_amount: 1,
///     refill_interval: Duration::from_secs(1),
/// };
/// let limiter = TokenBucket::new(config)?;
///
/// assert!(limiter.try_acquire());
/// assert!(limiter.try_acquire());
/// assert!(!limiter.try_acquire());
/// # Ok(())
/// # }
/// ```
pub struct TokenBucket<C: Clock = SystemClock> {
    name: Arc<str>,
    config: TokenBucketConfig,
    state: Arc<Mutex<BucketState>>,
    clock: Arc<C>,
}

impl TokenBucket<SystemClock> {
    /// Create a new token bucket with system clock
    pub fn new(config: TokenBucketConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> TokenBucket<C> {
    /// Create a new token bucket with custom clock
    pub fn with_clock(config: TokenBucketConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;

        Ok(Self {
            name: Arc::from("default"),
            state: Arc::new(Mutex::new(BucketState {
                tokens: config.capacity,
                last_refill: clock.now(),
            })),
            clock: Arc::new(clock),
            config,
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

    /// Credit every whole interval elapsed since the last refill.
    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill);
        let interval_nanos = self.config.refill_interval.as_nanos();
        let intervals = elapsed.as_nanos() / interval_nanos;
        if intervals == 0 {
            return;
        }

        let intervals = u64::try_from(intervals).unwrap_or(u64::MAX);
        let added = intervals.saturating_mul(self.config.refill_amount);
        state.tokens = state.tokens.saturating_add(added).min(self.config.capacity);

        // Advance by whole intervals only so the remainder is not lost.
        let advanced = u32::try_from(intervals)
            .ok()
            .and_then(|n| self.config.refill_interval.checked_mul(n));
        state.last_refill = match advanced {
            Some(step) => state.last_refill + step,
            None => now,
        };

        trace!(limiter = %self.name, added, tokens = state.tokens, "refilled tokens");
    }

    /// Take one token if available.
    pub fn try_acquire(&self) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.refill(&mut state, now);

        if state.tokens == 0 {
            debug!(limiter = %self.name, "rate limit exhausted");
            return false;
        }

        state.tokens -= 1;
        true
    }

    /// Get the current number of available tokens
    pub fn available_tokens(&self) -> u64 {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.refill(&mut state, now);
        state.tokens
    }
}

impl<C: Clock> Clone for TokenBucket<C> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<C: Clock> fmt::Debug for TokenBucket<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBucket")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("tokens", &self.state.lock().tokens)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::super::clock::MockClock;
    use super::*;

    fn bucket(capacity: u64, clock: &MockClock) -> TokenBucket<MockClock> {
        let config = TokenBucketConfig {
            capacity,
            refill_amount: 1,
            refill_interval: Duration::from_secs(1),
        };
        TokenBucket::with_clock(config, clock.clone()).unwrap()
    }

    #[test]
    fn test_token_bucket_basic() {
        let clock = MockClock::new();
        let limiter = bucket(3, &clock);

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        assert_eq!(limiter.available_tokens(), 0);
    }

    #[test]
    fn test_token_bucket_refill() {
        let clock = MockClock::new();
        let limiter = bucket(2, &clock);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());

        clock.advance(Duration::from_millis(999));
        assert!(!limiter.try_acquire());

        clock.advance(Duration::from_millis(1));
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_partial_intervals_carry_over() {
        let clock = MockClock::new();
        let limiter = bucket(5, &clock);
        for _ in 0..5 {
            assert!(limiter.try_acquire());
        }

        clock.advance(Duration::from_millis(1500));
        assert_eq!(limiter.available_tokens(), 1);
        clock.advance(Duration::from_millis(500));
        assert_eq!(limiter.available_tokens(), 2);
    }

    #[test]
    fn test_refill_caps_at_capacity() {
        let clock = MockClock::new();
        let limiter = bucket(3, &clock);
        assert!(limiter.try_acquire());

        clock.advance(Duration::from_secs(3600));
        assert_eq!(limiter.available_tokens(), 3);
    }

    #[test]
    fn test_concurrent_callers_never_overdraw() {
        let clock = MockClock::new();
        let limiter = bucket(50, &clock);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                thread::spawn(move || (0..20).filter(|_| limiter.try_acquire()).count())
            })
            .collect();
        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(granted, 50);
    }

    #[test]
    fn test_token_bucket_config_validation() {
        let valid = TokenBucketConfig::default();
        assert!(valid.validate().is_ok());
        assert!(TokenBucketConfig { capacity: 0, ..valid.clone() }.validate().is_err());
        assert!(TokenBucketConfig { refill_amount: 0, ..valid.clone() }.validate().is_err());
        assert!(TokenBucketConfig { refill_interval: Duration::ZERO, ..valid }.validate().is_err());
    }
}
