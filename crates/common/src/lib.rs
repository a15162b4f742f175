//! Generic building blocks shared across rpcshield crates.
//!
//! The [`resilience`] module holds the primitives the client runtime
//! composes into endpoint pipelines: a clock abstraction, token bucket rate
//! limiting, circuit breaking, retry execution and deadlines. Nothing here
//! knows about RPC shapes or outcome kinds; the core crate adapts these
//! primitives to call outcomes.
//!
//! # Feature Tiers
//!
//! - default: the resilience primitives
//! - `test-utils`: async polling and duration assertions for test suites

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod resilience;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(feature = "test-utils", test))]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState, Clock, Deadline,
    Jitter, MockClock, RateLimiterRegistry, RetryConfig, RetryError, RetryExecutor, RetryPolicy,
    SystemClock, TokenBucket,
};
