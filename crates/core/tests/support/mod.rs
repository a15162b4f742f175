//! Shared test helpers for `rpcshield-core` integration tests.
//!
//! [`ScriptedTransport`] answers unary calls from a queue of canned replies
//! and counts every call that reaches it, so tests can assert that local
//! rejections never touched the transport.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use rpcshield_core::{Payload, PayloadStream, StreamHandle, Transport};
use rpcshield_domain::Status;
use serde_json::json;
use tokio::sync::mpsc;

/// Method whose stream replies once, with every received message, at close.
pub const COLLECT: &str = "test.Service/Collect";

/// Method whose stream echoes each message as it arrives.
pub const ECHO: &str = "test.Service/Echo";

/// Method whose stream accepts one message, then rejects the call and stops
/// reading.
pub const REJECT: &str = "test.Service/Reject";

#[derive(Default)]
struct Shared {
    replies: Mutex<VecDeque<Result<Payload, Status>>>,
    calls: AtomicUsize,
}

/// Fake transport driven by a script of replies.
///
/// Once the script runs out, unary calls echo their request.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    shared: Arc<Shared>,
    latency: Duration,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every unary reply by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue failures that the next unary calls return in order.
    pub fn failing_with(self, statuses: impl IntoIterator<Item = Status>) -> Self {
        self.shared.replies.lock().unwrap().extend(statuses.into_iter().map(Err));
        self
    }

    /// Number of calls that reached the transport.
    pub fn calls(&self) -> usize {
        self.shared.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn unary(&self, _method: &str, request: Payload) -> Result<Payload, Status> {
        self.shared.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let scripted = self.shared.replies.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(request))
    }

    async fn server_stream(
        &self,
        _method: &str,
        request: Payload,
    ) -> Result<PayloadStream, Status> {
        self.shared.calls.fetch_add(1, Ordering::SeqCst);
        let count = request["count"].as_u64().unwrap_or(0);
        let items: Vec<Result<Payload, Status>> =
            (1..=count).map(|i| Ok(json!({ "value": i }))).collect();
        Ok(Box::pin(stream::iter(items)))
    }

    async fn open_stream(&self, method: &str) -> Result<StreamHandle, Status> {
        self.shared.calls.fetch_add(1, Ordering::SeqCst);
        let (outbound, mut peer_rx) = mpsc::channel::<Payload>(8);
        let (peer_tx, inbound) = mpsc::channel(8);
        if method == REJECT {
            tokio::spawn(async move {
                let _ = peer_rx.recv().await;
                let _ = peer_tx.send(Err(Status::invalid_argument("name must not be empty"))).await;
                drop(peer_rx);
            });
            return Ok(StreamHandle { outbound, inbound });
        }
        let collect = method == COLLECT;

        tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(message) = peer_rx.recv().await {
                if collect {
                    seen.push(message);
                } else if peer_tx.send(Ok(message)).await.is_err() {
                    return;
                }
            }
            if collect {
                let _ = peer_tx.send(Ok(Payload::Array(seen))).await;
            }
        });

        Ok(StreamHandle { outbound, inbound })
    }
}
