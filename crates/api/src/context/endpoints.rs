//! Endpoint construction from client configuration
//!
//! Every endpoint is keyed by its method path. The first endpoint built for a
//! method creates its token bucket and circuit breaker; later builds for the
//! same method share them.

use std::sync::Arc;
use std::time::Duration;

use rpcshield_common::resilience::{
    CircuitBreakerConfig, CircuitBreakerMetrics, CircuitBreakerRegistry, CircuitState, ConfigError,
    RateLimiterRegistry, RetryConfig, RetryExecutor, TokenBucketConfig,
};
use rpcshield_core::{
    BidiCall, BidiSession, CallChannel, ClientStreamCall, ClientStreamSession, Endpoint,
    EndpointBuilder, ResponseStream, RetryableKinds, ServerStreamCall, Transport, UnaryCall,
};
use rpcshield_domain::{
    BreakerSettings, ClientConfig, RateLimitSettings, Result, RetrySettings, RpcShieldError,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

fn invalid(err: ConfigError) -> RpcShieldError {
    RpcShieldError::Config(err.to_string())
}

pub(crate) fn bucket_config(settings: &RateLimitSettings) -> TokenBucketConfig {
    TokenBucketConfig {
        capacity: settings.capacity,
        refill_amount: settings.refill_amount,
        refill_interval: settings.refill_interval,
    }
}

pub(crate) fn breaker_config(settings: &BreakerSettings) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: settings.failure_threshold,
        cool_down: settings.cool_down,
        failure_window: settings.failure_window,
    }
}

/// Fixed base delay with proportional jitter on each wait.
pub(crate) fn retry_config(settings: &RetrySettings) -> Result<RetryConfig> {
    RetryConfig::builder()
        .max_attempts(settings.max_attempts)
        .base_delay(settings.base_delay)
        .proportional_jitter(settings.jitter_fraction)
        .build()
        .map_err(invalid)
}

/// Builds resilient endpoints over one shared channel.
#[derive(Clone)]
pub struct EndpointFactory {
    channel: CallChannel,
    limiters: RateLimiterRegistry,
    breakers: CircuitBreakerRegistry,
    retry: RetryConfig,
    retryable: RetryableKinds,
    call_timeout: Duration,
}

impl EndpointFactory {
    /// Validate `config` and prepare per-method state over `transport`.
    pub fn new(config: &ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let channel = CallChannel::new(transport).with_max_message_size(config.max_message_size);

        Ok(Self {
            channel,
            limiters: RateLimiterRegistry::new(bucket_config(&config.rate_limit))
                .map_err(invalid)?,
            breakers: CircuitBreakerRegistry::new(breaker_config(&config.circuit_breaker))
                .map_err(invalid)?,
            retry: retry_config(&config.retry)?,
            retryable: RetryableKinds::new(config.retry.retryable_kinds.iter().copied()),
            call_timeout: config.call_timeout,
        })
    }

    /// The channel every endpoint sends through.
    pub fn channel(&self) -> &CallChannel {
        &self.channel
    }

    /// Breaker state per method, sorted by method path.
    pub fn circuit_states(&self) -> Vec<(String, CircuitState)> {
        self.breakers.states()
    }

    /// Breaker counters per method, sorted by method path.
    pub fn circuit_metrics(&self) -> Vec<(String, CircuitBreakerMetrics)> {
        self.breakers.metrics()
    }

    /// Rate limit, circuit breaker and retry, sharing per-method state.
    fn resilient<Req, Resp>(&self, method: &'static str) -> Result<EndpointBuilder<Req, Resp>>
    where
        Req: Clone + Send + Sync + 'static,
        Resp: Send + 'static,
    {
        let bucket = self.limiters.get_or_create(method).map_err(invalid)?;
        let breaker = self.breakers.get_or_create(method).map_err(invalid)?;
        let executor = RetryExecutor::new(self.retry.clone(), self.retryable.clone());

        Ok(Endpoint::builder(method).rate_limit(bucket).circuit_breaker(breaker).retry(executor))
    }

    /// Unary endpoint bounded by the configured call timeout.
    pub fn unary<Req, Resp>(&self, method: &'static str) -> Result<Endpoint<Req, Resp>>
    where
        Req: Serialize + Clone + Send + Sync + 'static,
        Resp: DeserializeOwned + Send + 'static,
    {
        Ok(self
            .resilient(method)?
            .deadline(self.call_timeout)
            .build(UnaryCall::new(self.channel.clone(), method)))
    }

    /// Server-streaming endpoint. Only establishment is guarded; the stream
    /// itself lives under the caller's context.
    pub fn server_stream<Req, Resp>(
        &self,
        method: &'static str,
    ) -> Result<Endpoint<Req, ResponseStream<Resp>>>
    where
        Req: Serialize + Clone + Send + Sync + 'static,
        Resp: DeserializeOwned + Send + 'static,
    {
        Ok(self.resilient(method)?.build(ServerStreamCall::new(self.channel.clone(), method)))
    }

    /// Client-streaming endpoint; guards opening the session.
    pub fn client_stream<Req, Resp>(
        &self,
        method: &'static str,
    ) -> Result<Endpoint<(), ClientStreamSession<Req, Resp>>>
    where
        Req: Serialize + Send + 'static,
        Resp: DeserializeOwned + Send + 'static,
    {
        Ok(self.resilient(method)?.build(ClientStreamCall::new(self.channel.clone(), method)))
    }

    /// Bidi endpoint; guards opening the session.
    pub fn bidi<Req, Resp>(
        &self,
        method: &'static str,
    ) -> Result<Endpoint<(), BidiSession<Req, Resp>>>
    where
        Req: Serialize + Send + 'static,
        Resp: DeserializeOwned + Send + 'static,
    {
        Ok(self.resilient(method)?.build(BidiCall::new(self.channel.clone(), method)))
    }
}
