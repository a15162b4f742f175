//! Resilience patterns for fault tolerance
//!
//! This module provides **generic, reusable** primitives:
//! - **Token Bucket**: burst-tolerant admission control that never waits
//! - **Circuit Breaker**: stops calling a peer that keeps failing and tests
//!   it with a single trial after a cool-down
//! - **Retry Executor**: bounded re-execution with a jittered fixed delay
//!   that honours deadlines and cancellation
//! - **Deadline**: absolute points in time handed down through nested calls
//!
//! Everything is generic over the error type and reads time through
//! [`Clock`], so state machines can be driven with [`MockClock`] in tests.
//! The registries hand out one shared instance per endpoint name.

pub mod circuit_breaker;
pub mod clock;
pub mod deadline;
pub mod rate_limiter;
pub mod registry;
pub mod retry;

// Re-export circuit breaker types
pub use circuit_breaker::{
    CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState,
    ConfigError, ConfigResult,
};
pub use clock::{Clock, MockClock, SystemClock};
pub use deadline::Deadline;
pub use rate_limiter::{TokenBucket, TokenBucketConfig};
pub use registry::{CircuitBreakerRegistry, RateLimiterRegistry};
// Re-export retry types
pub use retry::{
    Jitter, RetryConfig, RetryConfigBuilder, RetryDecision, RetryError, RetryExecutor,
    RetryPolicy, RetryResult,
};
