//! Per-endpoint registries
//!
//! Breakers and buckets are keyed by endpoint name. Every pipeline built for
//! the same endpoint gets the same shared instance, and distinct endpoints
//! never share one.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState, ConfigResult,
};
use super::clock::{Clock, SystemClock};
use super::rate_limiter::{TokenBucket, TokenBucketConfig};

/// Circuit breakers keyed by endpoint name.
pub struct CircuitBreakerRegistry<C: Clock + Clone = SystemClock> {
    config: CircuitBreakerConfig,
    clock: C,
    breakers: Arc<DashMap<String, CircuitBreaker<C>>>,
}

impl CircuitBreakerRegistry<SystemClock> {
    /// Registry on the system clock; `config` is validated once here.
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock + Clone> CircuitBreakerRegistry<C> {
    /// Registry whose entries read time from `clock`.
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self { config, clock, breakers: Arc::new(DashMap::new()) })
    }

    /// Breaker for `endpoint`, created on first use.
    pub fn get_or_create(&self, endpoint: &str) -> ConfigResult<CircuitBreaker<C>> {
        if let Some(existing) = self.breakers.get(endpoint) {
            return Ok(existing.clone());
        }

        let entry = self.breakers.entry(endpoint.to_string());
        let breaker = match entry {
            dashmap::mapref::entry::Entry::Occupied(occupied) => occupied.get().clone(),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let breaker = CircuitBreaker::with_clock(self.config.clone(), self.clock.clone())?
                    .named(endpoint);
                debug!(endpoint, "created circuit breaker");
                vacant.insert(breaker).clone()
            }
        };
        Ok(breaker)
    }

    /// Snapshot of every breaker's state.
    pub fn states(&self) -> Vec<(String, CircuitState)> {
        let mut states: Vec<_> =
            self.breakers.iter().map(|e| (e.key().clone(), e.value().state())).collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    /// Snapshot of every breaker's counters, sorted by endpoint name.
    pub fn metrics(&self) -> Vec<(String, CircuitBreakerMetrics)> {
        let mut metrics: Vec<_> =
            self.breakers.iter().map(|e| (e.key().clone(), e.value().metrics())).collect();
        metrics.sort_by(|a, b| a.0.cmp(&b.0));
        metrics
    }

    /// Number of endpoints seen so far.
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Whether no endpoint has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

impl<C: Clock + Clone> Clone for CircuitBreakerRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            clock: self.clock.clone(),
            breakers: Arc::clone(&self.breakers),
        }
    }
}

/// Token buckets keyed by endpoint name.
pub struct RateLimiterRegistry<C: Clock + Clone = SystemClock> {
    config: TokenBucketConfig,
    clock: C,
    buckets: Arc<DashMap<String, TokenBucket<C>>>,
}

impl RateLimiterRegistry<SystemClock> {
    /// Registry on the system clock; `config` is validated once here.
    pub fn new(config: TokenBucketConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock + Clone> RateLimiterRegistry<C> {
    /// Registry whose entries read time from `clock`.
    pub fn with_clock(config: TokenBucketConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self { config, clock, buckets: Arc::new(DashMap::new()) })
    }

    /// Bucket for `endpoint`, created full on first use.
    pub fn get_or_create(&self, endpoint: &str) -> ConfigResult<TokenBucket<C>> {
        if let Some(existing) = self.buckets.get(endpoint) {
            return Ok(existing.clone());
        }

        let bucket = match self.buckets.entry(endpoint.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(occupied) => occupied.get().clone(),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let bucket =
                    TokenBucket::with_clock(self.config.clone(), self.clock.clone())?.named(endpoint);
                debug!(endpoint, capacity = self.config.capacity, "created token bucket");
                vacant.insert(bucket).clone()
            }
        };
        Ok(bucket)
    }

    /// Number of endpoints seen so far.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether no endpoint has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl<C: Clock + Clone> Clone for RateLimiterRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            clock: self.clock.clone(),
            buckets: Arc::clone(&self.buckets),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::clock::MockClock;
    use super::*;

    #[test]
    fn test_same_endpoint_shares_breaker() {
        let config = CircuitBreakerConfig { failure_threshold: 1, ..Default::default() };
        let registry = CircuitBreakerRegistry::with_clock(config, MockClock::new()).unwrap();

        let first = registry.get_or_create("greet.unary").unwrap();
        let second = registry.get_or_create("greet.unary").unwrap();
        let other = registry.get_or_create("blog.read").unwrap();

        first.try_acquire().unwrap().record_failure();
        assert_eq!(second.state(), CircuitState::Open);
        assert_eq!(other.state(), CircuitState::Closed);
        assert_eq!(registry.len(), 2);
        let metrics = registry.metrics();
        assert_eq!(metrics[1].0, "greet.unary");
        assert_eq!(metrics[1].1.total_calls, 1);
        assert_eq!(
            registry.states(),
            vec![
                ("blog.read".to_string(), CircuitState::Closed),
                ("greet.unary".to_string(), CircuitState::Open),
            ]
        );
    }

    #[test]
    fn test_same_endpoint_shares_bucket() {
        let config = TokenBucketConfig { capacity: 1, ..Default::default() };
        let registry = RateLimiterRegistry::with_clock(config, MockClock::new()).unwrap();

        assert!(registry.get_or_create("a").unwrap().try_acquire());
        assert!(!registry.get_or_create("a").unwrap().try_acquire());
        assert!(registry.get_or_create("b").unwrap().try_acquire());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = TokenBucketConfig { capacity: 0, ..Default::default() };
        assert!(RateLimiterRegistry::new(config).is_err());
    }
}
