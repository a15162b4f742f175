//! End-to-end behaviour of endpoint pipelines over a scripted transport.

#![allow(clippy::unwrap_used)]

mod support;

use std::sync::Arc;
use std::time::Duration;

use rpcshield_common::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, RetryConfig, RetryExecutor, TokenBucket,
    TokenBucketConfig,
};
use rpcshield_core::{
    BidiCall, CallChannel, CallContext, ClientStreamCall, Endpoint, Pacing, ResponseStream,
    RetryableKinds, ServerStreamCall, StreamCoordinator, UnaryCall,
};
use rpcshield_domain::{FailureKind, Status, StatusCode};
use serde_json::{json, Value};
use support::{ScriptedTransport, COLLECT, ECHO, REJECT};
use tokio::time::Instant;

const METHOD: &str = "test.Service/Unary";

fn channel(transport: &ScriptedTransport) -> CallChannel {
    CallChannel::new(Arc::new(transport.clone()))
}

fn breaker(threshold: u64) -> CircuitBreaker {
    CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: threshold,
        cool_down: Duration::from_secs(30),
        ..Default::default()
    })
    .unwrap()
}

fn retry(
    attempts: u32,
    kinds: impl IntoIterator<Item = FailureKind>,
) -> RetryExecutor<RetryableKinds> {
    let config = RetryConfig::builder()
        .max_attempts(attempts)
        .base_delay(Duration::from_secs(1))
        .no_jitter()
        .build()
        .unwrap();
    RetryExecutor::new(config, RetryableKinds::new(kinds))
}

fn unavailable(n: usize) -> Vec<Status> {
    (0..n).map(|_| Status::unavailable("connection reset")).collect()
}

#[tokio::test]
async fn test_open_breaker_never_reaches_the_transport() {
    let transport = ScriptedTransport::new().failing_with(unavailable(5));
    let breaker = breaker(2);
    let endpoint: Endpoint<Value, Value> = Endpoint::builder("unary")
        .circuit_breaker(breaker.clone())
        .build(UnaryCall::new(channel(&transport), METHOD));
    let ctx = CallContext::background();

    for _ in 0..2 {
        let failure = endpoint.invoke(&ctx, json!({})).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Unavailable);
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let failure = endpoint.invoke(&ctx, json!({})).await.unwrap_err();
    assert_eq!(failure.kind, FailureKind::CircuitOpen);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_retry_recovers_from_transient_failures() {
    let transport = ScriptedTransport::new().failing_with(unavailable(2));
    let endpoint: Endpoint<Value, Value> = Endpoint::builder("unary")
        .retry(retry(3, [FailureKind::Unavailable]))
        .build(UnaryCall::new(channel(&transport), METHOD));

    let started = Instant::now();
    let reply = endpoint.invoke(&CallContext::background(), json!({"n": 1})).await.unwrap();

    assert_eq!(reply, json!({"n": 1}));
    assert_eq!(transport.calls(), 3);
    assert_eq!(started.elapsed(), Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_retry_gives_up_after_max_attempts() {
    let transport = ScriptedTransport::new().failing_with(unavailable(10));
    let endpoint: Endpoint<Value, Value> = Endpoint::builder("unary")
        .retry(retry(3, [FailureKind::Unavailable]))
        .build(UnaryCall::new(channel(&transport), METHOD));

    let failure = endpoint.invoke(&CallContext::background(), json!({})).await.unwrap_err();

    assert_eq!(failure.kind, FailureKind::Unavailable);
    assert_eq!(transport.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_failures_surface_immediately() {
    let transport = ScriptedTransport::new()
        .failing_with([Status::invalid_argument("Cannot parse ID")]);
    let endpoint: Endpoint<Value, Value> = Endpoint::builder("unary")
        .retry(retry(3, [FailureKind::Unavailable, FailureKind::NotFound]))
        .build(UnaryCall::new(channel(&transport), METHOD));

    let failure = endpoint.invoke(&CallContext::background(), json!({})).await.unwrap_err();

    assert_eq!(failure.kind, FailureKind::InvalidArgument);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_rate_limit_rejects_without_io() {
    let transport = ScriptedTransport::new();
    let bucket = TokenBucket::new(TokenBucketConfig {
        capacity: 2,
        refill_amount: 1,
        refill_interval: Duration::from_secs(60),
    })
    .unwrap();
    let endpoint: Endpoint<Value, Value> = Endpoint::builder("unary")
        .rate_limit(bucket)
        .build(UnaryCall::new(channel(&transport), METHOD));
    let ctx = CallContext::background();

    endpoint.invoke(&ctx, json!(1)).await.unwrap();
    endpoint.invoke(&ctx, json!(2)).await.unwrap();
    let failure = endpoint.invoke(&ctx, json!(3)).await.unwrap_err();

    assert_eq!(failure.kind, FailureKind::RateLimited);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_peer_exceeds_the_deadline() {
    let transport = ScriptedTransport::new().with_latency(Duration::from_secs(3));
    let endpoint: Endpoint<Value, Value> = Endpoint::builder("slow")
        .deadline(Duration::from_secs(1))
        .build(UnaryCall::new(channel(&transport), METHOD));

    let started = Instant::now();
    let failure = endpoint.invoke(&CallContext::background(), json!({})).await.unwrap_err();

    assert_eq!(failure.kind, FailureKind::DeadlineExceeded);
    assert_eq!(started.elapsed(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_fast_peer_beats_the_deadline() {
    let transport = ScriptedTransport::new().with_latency(Duration::from_millis(200));
    let endpoint: Endpoint<Value, Value> = Endpoint::builder("fast")
        .deadline(Duration::from_secs(5))
        .build(UnaryCall::new(channel(&transport), METHOD));

    let reply = endpoint.invoke(&CallContext::background(), json!("hi")).await.unwrap();
    assert_eq!(reply, json!("hi"));
}

#[tokio::test(start_paused = true)]
async fn test_caller_cancellation_is_not_a_deadline() {
    let transport = ScriptedTransport::new().with_latency(Duration::from_secs(3));
    let breaker = breaker(1);
    let endpoint: Endpoint<Value, Value> = Endpoint::builder("slow")
        .circuit_breaker(breaker.clone())
        .deadline(Duration::from_secs(10))
        .build(UnaryCall::new(channel(&transport), METHOD));

    let ctx = CallContext::background();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        canceller.cancel();
    });

    let failure = endpoint.invoke(&ctx, json!({})).await.unwrap_err();

    assert_eq!(failure.kind, FailureKind::Cancelled);
    assert_eq!(breaker.state(), CircuitState::Closed, "cancellation is not a peer failure");
}

#[tokio::test(start_paused = true)]
async fn test_deadline_bounds_the_whole_retry_loop() {
    let transport = ScriptedTransport::new().failing_with(unavailable(10));
    let endpoint: Endpoint<Value, Value> = Endpoint::builder("bounded")
        .deadline(Duration::from_millis(1500))
        .retry(retry(5, [FailureKind::Unavailable]))
        .build(UnaryCall::new(channel(&transport), METHOD));

    let failure = endpoint.invoke(&CallContext::background(), json!({})).await.unwrap_err();

    assert_eq!(failure.kind, FailureKind::DeadlineExceeded);
    assert!(failure.detail.contains("connection reset"), "detail: {}", failure.detail);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_server_stream_yields_every_item() {
    let transport = ScriptedTransport::new();
    let endpoint: Endpoint<Value, ResponseStream<Value>> = Endpoint::builder("server-stream")
        .circuit_breaker(breaker(3))
        .build(ServerStreamCall::new(channel(&transport), METHOD));

    let stream = endpoint.invoke(&CallContext::background(), json!({"count": 4})).await.unwrap();
    let items = stream.collect_all().await.unwrap();

    let values: Vec<u64> = items.iter().map(|v| v["value"].as_u64().unwrap()).collect();
    assert_eq!(values, vec![1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn test_client_stream_aggregates_in_send_order() {
    let transport = ScriptedTransport::new();
    let endpoint: Endpoint<(), _> = Endpoint::builder("client-stream")
        .deadline(Duration::from_secs(30))
        .build(ClientStreamCall::<Value, Value>::new(channel(&transport), COLLECT));

    let session = endpoint.invoke(&CallContext::background(), ()).await.unwrap();
    let names = ["Stephane", "John", "Marc", "Lucy", "Mark"].map(Value::from);

    let started = Instant::now();
    let aggregate = StreamCoordinator::new(Pacing::Fixed(Duration::from_millis(100)))
        .run_client_stream(session, names.clone())
        .await
        .unwrap();

    assert_eq!(aggregate, Value::Array(names.to_vec()));
    assert_eq!(started.elapsed(), Duration::from_millis(400));
    assert_eq!(transport.calls(), 1, "one establishment for the whole stream");
}

#[tokio::test(start_paused = true)]
async fn test_client_stream_surfaces_the_peer_rejection() {
    let transport = ScriptedTransport::new();
    let endpoint: Endpoint<(), _> = Endpoint::builder("client-stream")
        .build(ClientStreamCall::<Value, Value>::new(channel(&transport), REJECT));

    let session = endpoint.invoke(&CallContext::background(), ()).await.unwrap();
    let names = ["Stephane", "", "Marc", "Lucy", "Mark"].map(Value::from);

    let failure = StreamCoordinator::new(Pacing::Fixed(Duration::from_millis(10)))
        .run_client_stream(session, names)
        .await
        .unwrap_err();

    assert_eq!(failure.kind, FailureKind::InvalidArgument);
    assert!(failure.detail.contains("must not be empty"), "detail: {}", failure.detail);
}

#[tokio::test]
async fn test_bidi_echoes_every_message() {
    let transport = ScriptedTransport::new();
    let endpoint: Endpoint<(), _> = Endpoint::builder("bidi")
        .circuit_breaker(breaker(3))
        .build(BidiCall::<Value, Value>::new(channel(&transport), ECHO));

    let session = endpoint.invoke(&CallContext::background(), ()).await.unwrap();
    let messages: Vec<Value> = (0..20).map(|i| json!(i)).collect();
    let report = StreamCoordinator::default().run_bidi(session, messages.clone()).await;

    report.outcome().unwrap();
    assert_eq!(report.sent, 20);
    assert_eq!(report.responses, messages);
}

#[tokio::test]
async fn test_oversize_request_is_rejected_before_the_transport() {
    let transport = ScriptedTransport::new();
    let channel = CallChannel::new(Arc::new(transport.clone())).with_max_message_size(64);
    let endpoint: Endpoint<Value, Value> =
        Endpoint::builder("limited").build(UnaryCall::new(channel, METHOD));

    let failure = endpoint
        .invoke(&CallContext::background(), json!({"body": "x".repeat(128)}))
        .await
        .unwrap_err();

    assert_eq!(failure.kind, FailureKind::Other);
    assert_eq!(transport.calls(), 0);
    assert_eq!(FailureKind::from(StatusCode::ResourceExhausted), FailureKind::Other);
}
