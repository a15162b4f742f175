//! Endpoint pipeline
//!
//! An [`Endpoint`] is a named, immutable chain of [`Middleware`] stages
//! folded around a terminal [`Invoke`] that talks to the [`CallChannel`].
//! However stages are handed to the [`EndpointBuilder`], they always run in
//! this order, outermost first:
//!
//! 1. rate limit
//! 2. circuit breaker
//! 3. retry
//! 4. deadline
//! 5. call channel
//!
//! Building an endpoint performs no I/O. For streaming shapes the pipeline
//! wraps stream establishment; in-stream messages bypass it.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rpcshield_common::resilience::{CircuitBreaker, RetryExecutor, TokenBucket};
use rpcshield_domain::CallOutcome;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::channel::{CallChannel, ResponseStream};
use crate::context::CallContext;
use crate::middleware::{
    CircuitBreakerLayer, DeadlineLayer, Invoke, Middleware, RateLimitLayer, RetryLayer,
    RetryableKinds, Stage,
};
use crate::stream::{BidiSession, ClientStreamSession};

type Layer<Req, Resp> = Arc<dyn Middleware<Req, Resp>>;

/// The remaining stages of one invocation.
struct Chain<'a, Req, Resp> {
    layers: &'a [Layer<Req, Resp>],
    terminal: &'a dyn Invoke<Req, Resp>,
}

#[async_trait]
impl<Req, Resp> Invoke<Req, Resp> for Chain<'_, Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    async fn invoke(&self, ctx: CallContext, request: Req) -> CallOutcome<Resp> {
        match self.layers.split_first() {
            Some((layer, rest)) => {
                let next = Chain { layers: rest, terminal: self.terminal };
                layer.call(ctx, request, &next).await
            }
            None => self.terminal.invoke(ctx, request).await,
        }
    }
}

/// A named callable unit. Cloning shares the stages and their state.
pub struct Endpoint<Req, Resp> {
    name: Arc<str>,
    timeout: Option<Duration>,
    layers: Arc<[Layer<Req, Resp>]>,
    terminal: Arc<dyn Invoke<Req, Resp>>,
}

impl<Req, Resp> Clone for Endpoint<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            timeout: self.timeout,
            layers: Arc::clone(&self.layers),
            terminal: Arc::clone(&self.terminal),
        }
    }
}

impl<Req, Resp> fmt::Debug for Endpoint<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("stages", &self.stages())
            .finish()
    }
}

impl<Req, Resp> Endpoint<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// Start collecting stages for an endpoint called `name`.
    pub fn builder(name: impl Into<Arc<str>>) -> EndpointBuilder<Req, Resp> {
        EndpointBuilder::new(name)
    }

    /// Name used in logs and spans.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stages in execution order, outermost first.
    pub fn stages(&self) -> Vec<Stage> {
        self.layers.iter().map(|layer| layer.stage()).collect()
    }

    /// Run one invocation through every stage.
    ///
    /// The endpoint's timeout becomes an absolute deadline here, before the
    /// first stage runs, so it bounds the whole invocation including retries.
    #[instrument(skip_all, fields(endpoint = %self.name))]
    pub async fn invoke(&self, ctx: &CallContext, request: Req) -> CallOutcome<Resp> {
        let ctx = match self.timeout {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx.clone(),
        };

        let chain = Chain { layers: &self.layers, terminal: self.terminal.as_ref() };
        let outcome = chain.invoke(ctx, request).await;

        match &outcome {
            Ok(_) => debug!("call succeeded"),
            Err(failure) => debug!(kind = %failure.kind, detail = %failure.detail, "call failed"),
        }
        outcome
    }
}

/// Collects stages for an [`Endpoint`].
///
/// Adding a stage kind twice keeps the last one.
pub struct EndpointBuilder<Req, Resp> {
    name: Arc<str>,
    layers: Vec<Layer<Req, Resp>>,
}

impl<Req, Resp> EndpointBuilder<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// An empty pipeline for the endpoint called `name`.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into(), layers: Vec::new() }
    }

    /// Reject calls once `bucket` runs dry.
    pub fn rate_limit(self, bucket: TokenBucket) -> Self {
        self.layer(RateLimitLayer::new(bucket))
    }

    /// Guard calls with `breaker`.
    pub fn circuit_breaker(self, breaker: CircuitBreaker) -> Self {
        self.layer(CircuitBreakerLayer::new(breaker))
    }

    /// Re-run failed attempts per `executor`.
    pub fn retry(self, executor: RetryExecutor<RetryableKinds>) -> Self
    where
        Req: Clone + Sync,
    {
        self.layer(RetryLayer::new(executor))
    }

    /// Bound every invocation to `timeout`, retries included.
    pub fn deadline(self, timeout: Duration) -> Self {
        self.layer(DeadlineLayer::new(timeout))
    }

    /// Add any stage; its [`Stage`] decides where it runs.
    pub fn layer(mut self, layer: impl Middleware<Req, Resp> + 'static) -> Self {
        let stage = layer.stage();
        self.layers.retain(|existing| existing.stage() != stage);
        self.layers.push(Arc::new(layer));
        self
    }

    /// Order the stages and attach the terminal call.
    ///
    /// The endpoint's timeout comes from whichever deadline stage survived.
    pub fn build(mut self, terminal: impl Invoke<Req, Resp> + 'static) -> Endpoint<Req, Resp> {
        self.layers.sort_by_key(|layer| layer.stage());
        let timeout = self.layers.iter().find_map(|layer| layer.call_timeout());
        debug!(
            endpoint = %self.name,
            stages = ?self.layers.iter().map(|l| l.stage()).collect::<Vec<_>>(),
            "endpoint built"
        );
        Endpoint {
            name: self.name,
            timeout,
            layers: self.layers.into(),
            terminal: Arc::new(terminal),
        }
    }
}

/// Terminal stage for unary calls.
pub struct UnaryCall<Req, Resp> {
    channel: CallChannel,
    method: &'static str,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> UnaryCall<Req, Resp> {
    /// Issue unary calls to `method` over `channel`.
    pub fn new(channel: CallChannel, method: &'static str) -> Self {
        Self { channel, method, _marker: PhantomData }
    }
}

#[async_trait]
impl<Req, Resp> Invoke<Req, Resp> for UnaryCall<Req, Resp>
where
    Req: Serialize + Send + Sync + 'static,
    Resp: DeserializeOwned + Send + 'static,
{
    async fn invoke(&self, ctx: CallContext, request: Req) -> CallOutcome<Resp> {
        self.channel.invoke_unary(self.method, &request, &ctx).await
    }
}

/// Terminal stage establishing server-streaming calls.
pub struct ServerStreamCall<Req, Resp> {
    channel: CallChannel,
    method: &'static str,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> ServerStreamCall<Req, Resp> {
    /// Issue server-streaming calls to `method` over `channel`.
    pub fn new(channel: CallChannel, method: &'static str) -> Self {
        Self { channel, method, _marker: PhantomData }
    }
}

#[async_trait]
impl<Req, Resp> Invoke<Req, ResponseStream<Resp>> for ServerStreamCall<Req, Resp>
where
    Req: Serialize + Send + Sync + 'static,
    Resp: DeserializeOwned + Send + 'static,
{
    async fn invoke(&self, ctx: CallContext, request: Req) -> CallOutcome<ResponseStream<Resp>> {
        self.channel.invoke_server_stream(self.method, &request, &ctx).await
    }
}

/// Terminal stage opening client-streaming sessions.
pub struct ClientStreamCall<Req, Resp> {
    channel: CallChannel,
    method: &'static str,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> ClientStreamCall<Req, Resp> {
    /// Issue client-streaming calls to `method` over `channel`.
    pub fn new(channel: CallChannel, method: &'static str) -> Self {
        Self { channel, method, _marker: PhantomData }
    }
}

#[async_trait]
impl<Req, Resp> Invoke<(), ClientStreamSession<Req, Resp>> for ClientStreamCall<Req, Resp>
where
    Req: Serialize + Send + 'static,
    Resp: DeserializeOwned + Send + 'static,
{
    async fn invoke(
        &self,
        ctx: CallContext,
        _request: (),
    ) -> CallOutcome<ClientStreamSession<Req, Resp>> {
        self.channel.open_client_stream(self.method, &ctx).await
    }
}

/// Terminal stage opening bidi sessions.
pub struct BidiCall<Req, Resp> {
    channel: CallChannel,
    method: &'static str,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> BidiCall<Req, Resp> {
    /// Issue bidi calls to `method` over `channel`.
    pub fn new(channel: CallChannel, method: &'static str) -> Self {
        Self { channel, method, _marker: PhantomData }
    }
}

#[async_trait]
impl<Req, Resp> Invoke<(), BidiSession<Req, Resp>> for BidiCall<Req, Resp>
where
    Req: Serialize + Send + 'static,
    Resp: DeserializeOwned + Send + 'static,
{
    async fn invoke(&self, ctx: CallContext, _request: ()) -> CallOutcome<BidiSession<Req, Resp>> {
        self.channel.open_bidi_stream(self.method, &ctx).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use rpcshield_common::resilience::{CircuitBreakerConfig, RetryConfig, TokenBucketConfig};
    use rpcshield_domain::{CallFailure, FailureKind};

    use super::*;

    struct Echo;

    #[async_trait]
    impl Invoke<u32, u32> for Echo {
        async fn invoke(&self, _ctx: CallContext, request: u32) -> CallOutcome<u32> {
            Ok(request)
        }
    }

    /// Records the order stages run in.
    struct Recorder {
        stage: Stage,
        log: Arc<Mutex<Vec<Stage>>>,
    }

    #[async_trait]
    impl Middleware<u32, u32> for Recorder {
        fn stage(&self) -> Stage {
            self.stage
        }

        async fn call(
            &self,
            ctx: CallContext,
            request: u32,
            next: &dyn Invoke<u32, u32>,
        ) -> CallOutcome<u32> {
            self.log.lock().unwrap().push(self.stage);
            next.invoke(ctx, request).await
        }
    }

    #[tokio::test]
    async fn test_builder_orders_stages_regardless_of_input_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let recorder = |stage| Recorder { stage, log: Arc::clone(&log) };

        let endpoint = EndpointBuilder::new("ordered")
            .layer(recorder(Stage::Deadline))
            .layer(recorder(Stage::Retry))
            .layer(recorder(Stage::RateLimit))
            .layer(recorder(Stage::CircuitBreaker))
            .build(Echo);

        let expected =
            vec![Stage::RateLimit, Stage::CircuitBreaker, Stage::Retry, Stage::Deadline];
        assert_eq!(endpoint.stages(), expected);

        assert_eq!(endpoint.invoke(&CallContext::background(), 7).await.unwrap(), 7);
        assert_eq!(*log.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_duplicate_stage_keeps_last() {
        let first = TokenBucket::new(TokenBucketConfig { capacity: 1, ..Default::default() })
            .unwrap();
        let second = TokenBucket::new(TokenBucketConfig { capacity: 5, ..Default::default() })
            .unwrap();

        let endpoint: Endpoint<u32, u32> =
            Endpoint::builder("dup").rate_limit(first).rate_limit(second.clone()).build(Echo);

        assert_eq!(endpoint.stages(), vec![Stage::RateLimit]);
        endpoint.invoke(&CallContext::background(), 1).await.unwrap();
        assert_eq!(second.available_tokens(), 4);
    }

    #[tokio::test]
    async fn test_rate_limit_runs_before_breaker_trial() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        })
        .unwrap();
        let bucket = TokenBucket::new(TokenBucketConfig { capacity: 1, ..Default::default() })
            .unwrap();

        let endpoint: Endpoint<u32, u32> = Endpoint::builder("order")
            .circuit_breaker(breaker.clone())
            .rate_limit(bucket)
            .build(Echo);

        endpoint.invoke(&CallContext::background(), 1).await.unwrap();
        let failure: CallFailure =
            endpoint.invoke(&CallContext::background(), 2).await.unwrap_err();

        assert_eq!(failure.kind, FailureKind::RateLimited);
        assert_eq!(breaker.metrics().total_calls, 1, "rejected call never reached the breaker");
    }

    #[tokio::test(start_paused = true)]
    async fn test_endpoint_timeout_bounds_retries() {
        struct Flaky;

        #[async_trait]
        impl Invoke<u32, u32> for Flaky {
            async fn invoke(&self, _ctx: CallContext, _request: u32) -> CallOutcome<u32> {
                Err(CallFailure::new(FailureKind::Unavailable, "connection refused"))
            }
        }

        let config = RetryConfig::builder()
            .max_attempts(10)
            .base_delay(Duration::from_secs(1))
            .no_jitter()
            .build()
            .unwrap();
        let endpoint: Endpoint<u32, u32> = Endpoint::builder("bounded")
            .deadline(Duration::from_millis(2500))
            .retry(RetryExecutor::new(config, RetryableKinds::new([FailureKind::Unavailable])))
            .build(Flaky);

        let started = tokio::time::Instant::now();
        let failure = endpoint.invoke(&CallContext::background(), 1).await.unwrap_err();

        assert_eq!(failure.kind, FailureKind::DeadlineExceeded);
        assert!(started.elapsed() <= Duration::from_millis(2500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacing_the_deadline_layer_updates_the_timeout() {
        struct Slow;

        #[async_trait]
        impl Invoke<u32, u32> for Slow {
            async fn invoke(&self, _ctx: CallContext, request: u32) -> CallOutcome<u32> {
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok(request)
            }
        }

        let endpoint: Endpoint<u32, u32> = Endpoint::builder("widened")
            .deadline(Duration::from_millis(100))
            .layer(DeadlineLayer::new(Duration::from_secs(1)))
            .build(Slow);

        assert!(format!("{endpoint:?}").contains("1s"));
        assert_eq!(endpoint.invoke(&CallContext::background(), 3).await.unwrap(), 3);
    }

    #[test]
    fn test_endpoint_without_deadline_has_no_timeout() {
        let endpoint: Endpoint<u32, u32> = Endpoint::builder("open").build(Echo);
        assert!(format!("{endpoint:?}").contains("timeout: None"));
    }
}
