//! Transport port
//!
//! The runtime never touches sockets. It hands encoded payloads to a
//! [`Transport`], which may be a network client or an in-process peer. One
//! transport is shared by every concurrent call, so implementations must keep
//! calls independent of each other.

use async_trait::async_trait;
use futures::stream::BoxStream;
use rpcshield_domain::Status;
use tokio::sync::mpsc;

/// An encoded message.
pub type Payload = serde_json::Value;

/// Responses of a server-streaming call, in arrival order.
pub type PayloadStream = BoxStream<'static, Result<Payload, Status>>;

/// Both directions of an open client or bidi stream.
///
/// Dropping `outbound` tells the peer no more messages follow. The peer ends
/// its direction by dropping its sender, which `inbound` reports as `None`.
#[derive(Debug)]
pub struct StreamHandle {
    /// Messages to the peer.
    pub outbound: mpsc::Sender<Payload>,
    /// Messages from the peer; an `Err` ends the stream with that status.
    pub inbound: mpsc::Receiver<Result<Payload, Status>>,
}

/// Carries encoded calls to a peer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// One request, one response.
    async fn unary(&self, method: &str, request: Payload) -> Result<Payload, Status>;

    /// One request, a finite stream of responses.
    async fn server_stream(&self, method: &str, request: Payload)
        -> Result<PayloadStream, Status>;

    /// Open a stream carrying messages in both directions.
    async fn open_stream(&self, method: &str) -> Result<StreamHandle, Status>;
}
