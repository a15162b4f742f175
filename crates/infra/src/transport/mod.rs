//! In-process transport peer
//!
//! [`InProcessTransport`] serves the greet and blog services from inside the
//! client process. Demos and tests use it where a network server would
//! otherwise be needed; a [`FaultPlan`] scripts failures and latency.

mod blog;
pub mod faults;
mod greet;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use rpcshield_core::{EntityStore, Payload, PayloadStream, StreamHandle, Transport};
use rpcshield_domain::constants::{
    METHOD_CREATE_BLOG, METHOD_DELETE_BLOG, METHOD_GREET, METHOD_GREET_EVERYONE,
    METHOD_GREET_MANY_TIMES, METHOD_GREET_WITH_DEADLINE, METHOD_LIST_BLOG, METHOD_LIST_BLOG_PAGE,
    METHOD_LONG_GREET, METHOD_READ_BLOG, METHOD_UPDATE_BLOG, STREAM_BUFFER,
};
use rpcshield_domain::{Status, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, instrument};

pub use faults::{Fault, FaultPlan};
pub use greet::GREET_MANY_TIMES_COUNT;

use crate::storage::InMemoryEntityStore;

/// Timing knobs of the in-process peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerSettings {
    /// How long `GreetWithDeadline` works before answering.
    pub deadline_delay: Duration,
    /// Gap between consecutive `GreetManyTimes` responses.
    pub stream_interval: Duration,
}

impl Default for PeerSettings {
    fn default() -> Self {
        Self { deadline_delay: Duration::from_secs(3), stream_interval: Duration::ZERO }
    }
}

/// Greet and blog services answering over channels in the same process.
#[derive(Clone)]
pub struct InProcessTransport {
    store: Arc<dyn EntityStore>,
    faults: FaultPlan,
    settings: PeerSettings,
}

impl fmt::Debug for InProcessTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcessTransport")
            .field("faults", &self.faults)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Default for InProcessTransport {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryEntityStore::new()))
    }
}

impl InProcessTransport {
    /// Peer backed by `store`, with default timings and no faults.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store, faults: FaultPlan::new(), settings: PeerSettings::default() }
    }

    /// Replace the peer's timings.
    pub fn with_settings(mut self, settings: PeerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Script failures with `faults`.
    pub fn with_faults(mut self, faults: FaultPlan) -> Self {
        self.faults = faults;
        self
    }

    /// The live fault script; clones share it.
    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    /// Store behind the blog service.
    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// Take the method's queued fault. Immediate failures come back as
    /// `Err`; a mid-stream failure comes back as the message count and status
    /// for the stream to apply.
    async fn apply_fault(&self, method: &str) -> Result<Option<(usize, Status)>, Status> {
        let Some(fault) = self.faults.on_call(method) else {
            return Ok(None);
        };
        if !fault.latency.is_zero() {
            tokio::time::sleep(fault.latency).await;
        }
        match (fault.status, fault.after) {
            (Some(status), Some(after)) => Ok(Some((after, status))),
            (Some(status), None) => {
                debug!(method, code = %status.code, "injected fault");
                Err(status)
            }
            (None, _) => Ok(None),
        }
    }
}

/// Let at most `after` responses through, then end the stream with `status`.
fn fail_responses(responses: PayloadStream, after: usize, status: Status) -> PayloadStream {
    debug!(after, code = %status.code, "injected mid-stream fault");
    responses.take(after).chain(stream::once(async move { Err(status) })).boxed()
}

/// Put a relay in front of `handler` that forwards `after` requests. The
/// next request fails the call with `status` and the relay stops reading.
/// A client that closes first gets the handler's normal answer.
fn fail_requests(handler: StreamHandle, after: usize, status: Status) -> StreamHandle {
    let (outbound, mut requests) = mpsc::channel::<Payload>(STREAM_BUFFER);
    let (replies, inbound) = mpsc::channel(STREAM_BUFFER);
    let StreamHandle { outbound: upstream, inbound: mut downstream } = handler;

    let relay_replies = replies.clone();
    let relay = tokio::spawn(async move {
        while let Some(reply) = downstream.recv().await {
            if relay_replies.send(reply).await.is_err() {
                return;
            }
        }
    });

    tokio::spawn(async move {
        let mut forwarded = 0usize;
        while let Some(message) = requests.recv().await {
            if forwarded == after {
                debug!(after, code = %status.code, "injected mid-stream fault");
                relay.abort();
                let _ = replies.send(Err(status)).await;
                return;
            }
            if upstream.send(message).await.is_err() {
                return;
            }
            forwarded += 1;
        }
    });

    StreamHandle { outbound, inbound }
}

pub(crate) fn decode<T: DeserializeOwned>(payload: Payload) -> Result<T, Status> {
    serde_json::from_value(payload)
        .map_err(|e| Status::invalid_argument(format!("malformed request: {e}")))
}

pub(crate) fn encode<T: Serialize>(message: &T) -> Result<Payload, Status> {
    serde_json::to_value(message)
        .map_err(|e| Status::internal(format!("failed to encode response: {e}")))
}

fn unknown_method(method: &str) -> Status {
    Status::new(StatusCode::Unknown, format!("unknown method {method}"))
}

#[async_trait]
impl Transport for InProcessTransport {
    #[instrument(level = "debug", skip(self, request))]
    async fn unary(&self, method: &str, request: Payload) -> Result<Payload, Status> {
        // Unary calls have no stream to fail partway through.
        if let Some((_, status)) = self.apply_fault(method).await? {
            return Err(status);
        }
        let store = self.store.as_ref();

        match method {
            METHOD_GREET => greet::greet(request),
            METHOD_GREET_WITH_DEADLINE => {
                greet::greet_with_deadline(request, self.settings.deadline_delay).await
            }
            METHOD_CREATE_BLOG => blog::create(store, request).await,
            METHOD_READ_BLOG => blog::read(store, request).await,
            METHOD_UPDATE_BLOG => blog::update(store, request).await,
            METHOD_DELETE_BLOG => blog::delete(store, request).await,
            METHOD_LIST_BLOG_PAGE => blog::list_page(store, request).await,
            other => Err(unknown_method(other)),
        }
    }

    #[instrument(level = "debug", skip(self, request))]
    async fn server_stream(
        &self,
        method: &str,
        request: Payload,
    ) -> Result<PayloadStream, Status> {
        let fault = self.apply_fault(method).await?;

        let stream = match method {
            METHOD_GREET_MANY_TIMES => {
                greet::greet_many_times(request, self.settings.stream_interval)
            }
            METHOD_LIST_BLOG => blog::list(self.store.as_ref()).await,
            other => Err(unknown_method(other)),
        }?;
        Ok(match fault {
            Some((after, status)) => fail_responses(stream, after, status),
            None => stream,
        })
    }

    #[instrument(level = "debug", skip(self))]
    async fn open_stream(&self, method: &str) -> Result<StreamHandle, Status> {
        let fault = self.apply_fault(method).await?;

        let handle = match method {
            METHOD_LONG_GREET => greet::long_greet(),
            METHOD_GREET_EVERYONE => greet::greet_everyone(),
            other => return Err(unknown_method(other)),
        };
        Ok(match fault {
            Some((after, status)) => fail_requests(handle, after, status),
            None => handle,
        })
    }
}
