//! Pipeline stages
//!
//! A [`Middleware`] wraps the rest of the pipeline, reached through the
//! `next` [`Invoke`] it is handed. Each stage either forwards a failure
//! unchanged or (for retry) re-runs `next`; none of them swallows a failure
//! kind.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rpcshield_common::resilience::{
    CircuitBreaker, RetryDecision, RetryError, RetryExecutor, RetryPolicy, TokenBucket,
};
use rpcshield_domain::{CallFailure, CallOutcome, FailureKind};
use tracing::{debug, warn};

use crate::context::CallContext;

/// Anything that can run one call: a terminal channel adapter or the rest of
/// a pipeline.
#[async_trait]
pub trait Invoke<Req: Send + 'static, Resp: Send + 'static>: Send + Sync {
    /// Run the call under `ctx`.
    async fn invoke(&self, ctx: CallContext, request: Req) -> CallOutcome<Resp>;
}

/// Position of a stage in the pipeline, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Admission control, before any other work.
    RateLimit,
    /// Breaker permit around everything inside it.
    CircuitBreaker,
    /// Re-runs the stages inside it.
    Retry,
    /// Innermost bound on each call.
    Deadline,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::RateLimit => "rate_limit",
            Stage::CircuitBreaker => "circuit_breaker",
            Stage::Retry => "retry",
            Stage::Deadline => "deadline",
        };
        f.write_str(label)
    }
}

/// One decorator in an endpoint pipeline.
#[async_trait]
pub trait Middleware<Req: Send + 'static, Resp: Send + 'static>: Send + Sync {
    /// Where this layer sits in the pipeline.
    fn stage(&self) -> Stage;

    /// Bound this stage puts on the whole call, if any.
    fn call_timeout(&self) -> Option<Duration> {
        None
    }

    /// Handle one call, reaching the rest of the pipeline through `next`.
    async fn call(
        &self,
        ctx: CallContext,
        request: Req,
        next: &dyn Invoke<Req, Resp>,
    ) -> CallOutcome<Resp>;
}

/// Rejects with `RateLimited` when the endpoint's bucket is empty.
#[derive(Debug, Clone)]
pub struct RateLimitLayer {
    bucket: TokenBucket,
}

impl RateLimitLayer {
    /// Layer drawing one token from `bucket` per call.
    pub fn new(bucket: TokenBucket) -> Self {
        Self { bucket }
    }
}

#[async_trait]
impl<Req, Resp> Middleware<Req, Resp> for RateLimitLayer
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn stage(&self) -> Stage {
        Stage::RateLimit
    }

    async fn call(
        &self,
        ctx: CallContext,
        request: Req,
        next: &dyn Invoke<Req, Resp>,
    ) -> CallOutcome<Resp> {
        if !self.bucket.try_acquire() {
            return Err(CallFailure::rate_limited(self.bucket.name()));
        }
        next.invoke(ctx, request).await
    }
}

/// Rejects with `CircuitOpen` while the endpoint's breaker refuses calls and
/// reports every other outcome back to it.
///
/// Caller cancellation is not the endpoint's fault and yields no verdict.
#[derive(Debug, Clone)]
pub struct CircuitBreakerLayer {
    breaker: CircuitBreaker,
}

impl CircuitBreakerLayer {
    /// Layer guarded by `breaker`.
    pub fn new(breaker: CircuitBreaker) -> Self {
        Self { breaker }
    }
}

#[async_trait]
impl<Req, Resp> Middleware<Req, Resp> for CircuitBreakerLayer
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn stage(&self) -> Stage {
        Stage::CircuitBreaker
    }

    async fn call(
        &self,
        ctx: CallContext,
        request: Req,
        next: &dyn Invoke<Req, Resp>,
    ) -> CallOutcome<Resp> {
        let Some(permit) = self.breaker.try_acquire() else {
            return Err(CallFailure::circuit_open(self.breaker.name()));
        };

        let outcome = next.invoke(ctx, request).await;
        match &outcome {
            Ok(_) => permit.record_success(),
            Err(failure) if failure.kind == FailureKind::Cancelled => permit.release(),
            Err(_) => permit.record_failure(),
        }
        outcome
    }
}

/// Retries failures whose kind is listed; never retries cancellation,
/// deadline expiry or local rejections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryableKinds(BTreeSet<FailureKind>);

impl RetryableKinds {
    /// Retry exactly these kinds.
    pub fn new(kinds: impl IntoIterator<Item = FailureKind>) -> Self {
        Self(kinds.into_iter().collect())
    }

    /// Whether `kind` is retryable; terminal and local kinds never are.
    pub fn contains(&self, kind: FailureKind) -> bool {
        !kind.is_terminal() && !kind.is_local() && self.0.contains(&kind)
    }
}

impl RetryPolicy<CallFailure> for RetryableKinds {
    fn should_retry(&self, error: &CallFailure, _attempt: u32) -> RetryDecision {
        if self.contains(error.kind) {
            RetryDecision::Retry
        } else {
            RetryDecision::Stop
        }
    }
}

/// Re-runs the inner pipeline under a retry policy, inside the call's
/// deadline.
#[derive(Debug, Clone)]
pub struct RetryLayer {
    executor: Arc<RetryExecutor<RetryableKinds>>,
}

impl RetryLayer {
    /// Layer driven by `executor`.
    pub fn new(executor: RetryExecutor<RetryableKinds>) -> Self {
        Self { executor: Arc::new(executor) }
    }
}

#[async_trait]
impl<Req, Resp> Middleware<Req, Resp> for RetryLayer
where
    Req: Clone + Send + Sync + 'static,
    Resp: Send + 'static,
{
    fn stage(&self) -> Stage {
        Stage::Retry
    }

    async fn call(
        &self,
        ctx: CallContext,
        request: Req,
        next: &dyn Invoke<Req, Resp>,
    ) -> CallOutcome<Resp> {
        let result = self
            .executor
            .execute(ctx.deadline(), Some(ctx.cancellation_token()), |attempt| {
                let ctx = ctx.clone();
                let request = request.clone();
                async move {
                    debug!(attempt, "attempt started");
                    next.invoke(ctx, request).await
                }
            })
            .await;

        let error = match result {
            Ok(response) => return Ok(response),
            Err(error) => error,
        };
        debug!(attempts = error.attempts(), "retry loop gave up");
        match error {
            RetryError::AttemptsExhausted { last_error, .. } => Err(last_error),
            RetryError::NonRetryable { source, .. } => Err(source),
            RetryError::DeadlineExceeded { attempts, last_error } => {
                let detail = match last_error {
                    Some(last) => format!("deadline exceeded after {attempts} attempts; last failure: {last}"),
                    None => format!("deadline exceeded after {attempts} attempts"),
                };
                Err(CallFailure::new(FailureKind::DeadlineExceeded, detail))
            }
            RetryError::Cancelled { .. } => Err(CallFailure::cancelled()),
        }
    }
}

/// Enforces the call's absolute deadline around the inner call.
///
/// The deadline itself is attached when the call enters the endpoint, so it
/// covers every retry. If it passes before the inner call finishes, the inner
/// call is dropped, its context cancelled, and the outcome is
/// `DeadlineExceeded`. Caller cancellation still yields `Cancelled`.
#[derive(Debug, Clone, Copy)]
pub struct DeadlineLayer {
    timeout: Duration,
}

impl DeadlineLayer {
    /// Bound each call to `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// The configured bound.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl<Req, Resp> Middleware<Req, Resp> for DeadlineLayer
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn stage(&self) -> Stage {
        Stage::Deadline
    }

    fn call_timeout(&self) -> Option<Duration> {
        Some(self.timeout)
    }

    async fn call(
        &self,
        ctx: CallContext,
        request: Req,
        next: &dyn Invoke<Req, Resp>,
    ) -> CallOutcome<Resp> {
        // Reached without endpoint entry (e.g. a hand-built chain).
        let ctx = match ctx.deadline() {
            Some(_) => ctx,
            None => ctx.with_timeout(self.timeout),
        };
        let Some(deadline) = ctx.deadline() else {
            return next.invoke(ctx, request).await;
        };

        let inner = ctx.child();
        let attempt = next.invoke(inner.clone(), request);

        tokio::select! {
            biased;
            outcome = attempt => match outcome {
                Err(failure)
                    if failure.kind == FailureKind::Cancelled
                        && !ctx.is_cancelled()
                        && deadline.is_expired() =>
                {
                    Err(CallFailure::deadline_exceeded())
                }
                other => other,
            },
            _ = ctx.cancellation_token().cancelled() => Err(CallFailure::cancelled()),
            _ = deadline.sleep() => {
                inner.cancel();
                warn!(timeout = ?self.timeout, "deadline exceeded");
                Err(CallFailure::deadline_exceeded())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use rpcshield_common::resilience::{
        CircuitBreakerConfig, CircuitState, RetryConfig, TokenBucketConfig,
    };

    use super::*;

    /// Fails with the scripted kinds in order, then succeeds.
    struct Scripted {
        failures: Vec<FailureKind>,
        calls: AtomicU32,
        latency: Duration,
    }

    impl Scripted {
        fn new(failures: Vec<FailureKind>) -> Self {
            Self { failures, calls: AtomicU32::new(0), latency: Duration::ZERO }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Invoke<u32, u32> for Scripted {
        async fn invoke(&self, ctx: CallContext, request: u32) -> CallOutcome<u32> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            if !self.latency.is_zero() {
                tokio::select! {
                    failure = ctx.done() => return Err(failure),
                    _ = tokio::time::sleep(self.latency) => {}
                }
            }
            match self.failures.get(n) {
                Some(kind) => Err(CallFailure::new(*kind, "scripted")),
                None => Ok(request),
            }
        }
    }

    fn retry(attempts: u32, kinds: &[FailureKind]) -> RetryLayer {
        let config = RetryConfig::builder()
            .max_attempts(attempts)
            .base_delay(Duration::from_secs(1))
            .proportional_jitter(0.1)
            .build()
            .unwrap();
        RetryLayer::new(RetryExecutor::new(config, RetryableKinds::new(kinds.iter().copied())))
    }

    #[tokio::test]
    async fn test_rate_limit_layer_rejects_without_calling_inner() {
        let config = TokenBucketConfig { capacity: 1, ..Default::default() };
        let layer = RateLimitLayer::new(TokenBucket::new(config).unwrap().named("unit"));
        let inner = Scripted::new(vec![]);

        assert!(layer.call(CallContext::background(), 1, &inner).await.is_ok());
        let failure = layer.call(CallContext::background(), 2, &inner).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::RateLimited);
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn test_breaker_layer_ignores_cancellation() {
        let config = CircuitBreakerConfig { failure_threshold: 1, ..Default::default() };
        let breaker = CircuitBreaker::new(config).unwrap();
        let layer = CircuitBreakerLayer::new(breaker.clone());

        let cancelled = Scripted::new(vec![FailureKind::Cancelled]);
        let _ = layer.call(CallContext::background(), 1, &cancelled).await;
        assert_eq!(breaker.state(), CircuitState::Closed);

        let failing = Scripted::new(vec![FailureKind::Unavailable]);
        let _ = layer.call(CallContext::background(), 1, &failing).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        let healthy = Scripted::new(vec![]);
        let failure = layer.call(CallContext::background(), 1, &healthy).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::CircuitOpen);
        assert_eq!(healthy.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_layer_surfaces_last_failure() {
        let layer = retry(3, &[FailureKind::Unavailable]);
        let inner = Scripted::new(vec![FailureKind::Unavailable; 3]);

        let failure = layer.call(CallContext::background(), 1, &inner).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Unavailable);
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_layer_never_retries_terminal_kinds() {
        let layer = retry(3, &[FailureKind::Cancelled, FailureKind::DeadlineExceeded]);
        let inner = Scripted::new(vec![FailureKind::DeadlineExceeded; 3]);

        let failure = layer.call(CallContext::background(), 1, &inner).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::DeadlineExceeded);
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_layer_stops_at_deadline_with_last_failure() {
        let layer = retry(5, &[FailureKind::Aborted]);
        let inner = Scripted::new(vec![FailureKind::Aborted; 5]);
        let ctx = CallContext::background().with_timeout(Duration::from_millis(1500));

        let failure = layer.call(ctx, 1, &inner).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::DeadlineExceeded);
        assert!(failure.detail.contains("aborted"), "{}", failure.detail);
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_layer_classifies_expiry() {
        let layer = DeadlineLayer::new(Duration::from_millis(100));
        let mut inner = Scripted::new(vec![]);
        inner.latency = Duration::from_secs(3);

        let failure = layer.call(CallContext::background(), 1, &inner).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::DeadlineExceeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_layer_classifies_caller_cancellation() {
        let layer = DeadlineLayer::new(Duration::from_secs(10));
        let mut inner = Scripted::new(vec![]);
        inner.latency = Duration::from_secs(3);

        let ctx = CallContext::background();
        let trigger = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let failure = layer.call(ctx, 1, &inner).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Cancelled);
    }

    #[test]
    fn test_retryable_kinds_exclude_terminal_and_local() {
        let kinds = RetryableKinds::new([
            FailureKind::NotFound,
            FailureKind::Cancelled,
            FailureKind::RateLimited,
        ]);
        assert!(kinds.contains(FailureKind::NotFound));
        assert!(!kinds.contains(FailureKind::Cancelled));
        assert!(!kinds.contains(FailureKind::RateLimited));
        assert!(!kinds.contains(FailureKind::Unavailable));
    }
}
