//! Generic retry strategy implementation with deadline and cancellation
//! awareness
//!
//! [`RetryExecutor`] re-runs a fallible async operation under a
//! [`RetryPolicy`]. Between attempts it sleeps for the configured backoff
//! (with jitter), but it never sleeps past the caller's deadline and it stops
//! as soon as the caller's cancellation token fires.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::circuit_breaker::{ConfigError, ConfigResult};
use super::deadline::Deadline;

/// Errors that can occur during retry operations
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// All retry attempts have been exhausted
    #[error("All retry attempts exhausted after {attempts} tries: {last_error}")]
    AttemptsExhausted {
        /// Attempts made.
        attempts: u32,
        /// Failure of the final attempt.
        last_error: E,
    },

    /// The operation failed with a non-retryable error
    #[error("Operation failed with non-retryable error: {source}")]
    NonRetryable {
        /// Attempts made.
        attempts: u32,
        /// The failure the policy refused to retry.
        source: E,
    },

    /// The deadline passed, or would pass before the next attempt could start
    #[error("Deadline exceeded after {attempts} attempts")]
    DeadlineExceeded {
        /// Attempts made.
        attempts: u32,
        /// Failure of the last finished attempt, if any.
        last_error: Option<E>,
    },

    /// The caller cancelled while waiting between attempts
    #[error("Retry cancelled after {attempts} attempts")]
    Cancelled {
        /// Attempts made.
        attempts: u32,
    },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::AttemptsExhausted { attempts, .. }
            | RetryError::NonRetryable { attempts, .. }
            | RetryError::DeadlineExceeded { attempts, .. }
            | RetryError::Cancelled { attempts } => *attempts,
        }
    }
}

/// Result type for retry operations
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Trait for determining whether an error should be retried
pub trait RetryPolicy<E> {
    /// Decide whether the failure of attempt `attempt` (1-based) is retried.
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Decision for whether to retry an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the configured backoff
    Retry,
    /// Don't retry the operation
    Stop,
}

/// Randomisation applied on top of the base delay
#[derive(Debug, Clone, PartialEq)]
pub enum Jitter {
    /// No jitter
    None,
    /// Uniform in [delay * (1 - fraction), delay * (1 + fraction)]
    Proportional {
        /// Spread on either side of the delay, within `[0.0, 1.0]`.
        fraction: f64,
    },
}

impl Jitter {
    /// Apply jitter to the base delay
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            Jitter::Proportional { fraction } if *fraction > 0.0 => {
                let fraction = fraction.min(1.0);
                let factor = rand::thread_rng().gen_range((1.0 - fraction)..=(1.0 + fraction));
                Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(delay)
            }
            _ => delay,
        }
    }
}

/// Configuration for retry behavior
///
/// Every retry waits `base_delay` with jitter applied; the delay does not
/// grow between attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    /// Delay before each retry, before jitter
    pub base_delay: Duration,
    /// Jitter to apply to delays
    pub jitter: Jitter,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            jitter: Jitter::Proportional { fraction: 0.1 },
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration builder
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                message: "max_attempts must be greater than 0".to_string(),
            });
        }

        if let Jitter::Proportional { fraction } = self.jitter {
            if !(0.0..=1.0).contains(&fraction) {
                return Err(ConfigError::Invalid {
                    message: "jitter fraction must be within [0.0, 1.0]".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Delay before the next retry, jitter applied.
    pub fn next_delay(&self) -> Duration {
        self.jitter.apply(self.base_delay)
    }
}

/// Builder for retry configuration
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    /// Builder starting from the defaults.
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    /// Total attempts, the first one included.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    /// Delay before each retry, before jitter.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay = delay;
        self
    }

    /// Wait exactly `base_delay`.
    pub fn no_jitter(mut self) -> Self {
        self.config.jitter = Jitter::None;
        self
    }

    /// Spread each delay uniformly by `fraction` either side of `base_delay`.
    pub fn proportional_jitter(mut self, fraction: f64) -> Self {
        self.config.jitter = Jitter::Proportional { fraction };
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> ConfigResult<RetryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Retry executor that handles the retry logic
#[derive(Debug, Clone)]
pub struct RetryExecutor<P> {
    config: RetryConfig,
    policy: P,
}

impl<P> RetryExecutor<P> {
    /// Executor retrying under `config`, asking `policy` after each failure.
    pub fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy }
    }

    /// The configuration this executor retries under.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation with retry logic, bounded by `deadline` and
    /// `cancel`.
    ///
    /// The operation receives the 1-based attempt number.
    #[instrument(skip_all, fields(max_attempts = self.config.max_attempts))]
    pub async fn execute<F, Fut, T, E>(
        &self,
        deadline: Option<Deadline>,
        cancel: Option<&CancellationToken>,
        mut operation: F,
    ) -> RetryResult<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            debug!(attempt, "executing operation");

            let error = match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if self.policy.should_retry(&error, attempt) == RetryDecision::Stop {
                debug!(attempt, %error, "error is not retryable");
                return Err(RetryError::NonRetryable { attempts: attempt, source: error });
            }
            if attempt >= self.config.max_attempts {
                warn!(attempt, %error, "all retry attempts exhausted");
                return Err(RetryError::AttemptsExhausted { attempts: attempt, last_error: error });
            }

            let delay = self.config.next_delay();
            if let Some(deadline) = deadline {
                if deadline.remaining() <= delay {
                    warn!(attempt, %error, ?delay, "backoff would outlast the deadline");
                    return Err(RetryError::DeadlineExceeded {
                        attempts: attempt,
                        last_error: Some(error),
                    });
                }
            }

            warn!(attempt, %error, ?delay, "operation failed, retrying");

            let cancelled = async {
                match cancel {
                    Some(token) => token.cancelled().await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                _ = cancelled => {
                    debug!(attempt, "cancelled during backoff");
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
