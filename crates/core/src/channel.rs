//! Call channel
//!
//! Typed invocation over a [`Transport`] in all four call shapes. This is the
//! only place transport statuses turn into [`CallFailure`]s: every method
//! returns a tagged outcome and nothing escapes as an untyped error.
//!
//! Each transport await races the call context, so cancellation and deadline
//! expiry abort in-flight I/O promptly and are reported as `Cancelled` and
//! `DeadlineExceeded` respectively.

use std::fmt;
use std::io;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::StreamExt;
use rpcshield_domain::constants::DEFAULT_MAX_MESSAGE_SIZE;
use rpcshield_domain::{CallFailure, CallOutcome, FailureKind, Status, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::context::CallContext;
use crate::stream::{BidiSession, ClientStreamSession, RecvHalf, SendHalf};
use crate::transport::{Payload, PayloadStream, Transport};

/// Message encoding with the size limit applied to outbound messages.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Codec {
    max_message_size: usize,
}

impl Codec {
    pub(crate) fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    pub(crate) fn encode<T: Serialize>(&self, message: &T) -> CallOutcome<Payload> {
        let encode_failure = |e: serde_json::Error| {
            CallFailure::new(FailureKind::Other, format!("failed to encode request: {e}"))
        };
        let payload = serde_json::to_value(message).map_err(encode_failure)?;

        let mut size = ByteCount(0);
        serde_json::to_writer(&mut size, &payload).map_err(encode_failure)?;
        if size.0 > self.max_message_size {
            return Err(Status::new(
                StatusCode::ResourceExhausted,
                format!(
                    "message of {} bytes exceeds the {} byte limit",
                    size.0, self.max_message_size
                ),
            )
            .into());
        }
        Ok(payload)
    }

    pub(crate) fn decode<T: DeserializeOwned>(&self, payload: Payload) -> CallOutcome<T> {
        serde_json::from_value(payload).map_err(|e| {
            CallFailure::new(FailureKind::Other, format!("malformed response: {e}"))
        })
    }
}

/// Sink that only counts the bytes written to it.
struct ByteCount(usize);

impl io::Write for ByteCount {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Shared handle for making calls over one transport.
#[derive(Clone)]
pub struct CallChannel {
    transport: Arc<dyn Transport>,
    codec: Codec,
}

impl fmt::Debug for CallChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallChannel").field("codec", &self.codec).finish_non_exhaustive()
    }
}

impl CallChannel {
    /// Channel with the default message size limit.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport, codec: Codec::new(DEFAULT_MAX_MESSAGE_SIZE) }
    }

    /// Reject outbound messages larger than `bytes` once encoded.
    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.codec = Codec::new(bytes);
        self
    }

    /// One request, one response.
    #[instrument(level = "debug", skip(self, request, ctx))]
    pub async fn invoke_unary<Req, Resp>(
        &self,
        method: &str,
        request: &Req,
        ctx: &CallContext,
    ) -> CallOutcome<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        if let Some(failure) = ctx.check() {
            return Err(failure);
        }
        let payload = self.codec.encode(request)?;

        let reply = tokio::select! {
            biased;
            failure = ctx.done() => Err(failure),
            reply = self.transport.unary(method, payload) => reply.map_err(CallFailure::from),
        };

        let outcome = reply.and_then(|payload| self.codec.decode(payload));
        if let Err(failure) = &outcome {
            debug!(kind = %failure.kind, detail = %failure.detail, "unary call failed");
        }
        outcome
    }

    /// One request, a lazy stream of responses.
    ///
    /// Only establishment is reported here; failures after that arrive as
    /// items of the returned stream.
    #[instrument(level = "debug", skip(self, request, ctx))]
    pub async fn invoke_server_stream<Req, Resp>(
        &self,
        method: &str,
        request: &Req,
        ctx: &CallContext,
    ) -> CallOutcome<ResponseStream<Resp>>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        if let Some(failure) = ctx.check() {
            return Err(failure);
        }
        let payload = self.codec.encode(request)?;

        let stream = tokio::select! {
            biased;
            failure = ctx.done() => Err(failure),
            stream = self.transport.server_stream(method, payload) => {
                stream.map_err(CallFailure::from)
            }
        }?;

        Ok(ResponseStream {
            inner: Some(stream),
            codec: self.codec,
            ctx: ctx.clone(),
            _marker: PhantomData,
        })
    }

    /// Open a client-streaming session.
    pub async fn open_client_stream<Req, Resp>(
        &self,
        method: &str,
        ctx: &CallContext,
    ) -> CallOutcome<ClientStreamSession<Req, Resp>>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let (send, recv) = self.open(method, ctx).await?;
        Ok(ClientStreamSession::new(send, recv))
    }

    /// Open a bidirectional session.
    pub async fn open_bidi_stream<Req, Resp>(
        &self,
        method: &str,
        ctx: &CallContext,
    ) -> CallOutcome<BidiSession<Req, Resp>>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let (send, recv) = self.open(method, ctx).await?;
        Ok(BidiSession::new(send, recv))
    }

    #[instrument(level = "debug", skip(self, ctx))]
    async fn open<Req, Resp>(
        &self,
        method: &str,
        ctx: &CallContext,
    ) -> CallOutcome<(SendHalf<Req>, RecvHalf<Resp>)> {
        if let Some(failure) = ctx.check() {
            return Err(failure);
        }

        let handle = tokio::select! {
            biased;
            failure = ctx.done() => Err(failure),
            handle = self.transport.open_stream(method) => handle.map_err(CallFailure::from),
        }?;

        debug!("stream opened");
        Ok((
            SendHalf::new(handle.outbound, self.codec, ctx.clone()),
            RecvHalf::new(handle.inbound, self.codec, ctx.clone()),
        ))
    }
}

/// Lazily decoded responses of a server-streaming call.
///
/// Finite and not restartable. The stream ends after yielding its first
/// failure.
pub struct ResponseStream<Resp> {
    inner: Option<PayloadStream>,
    codec: Codec,
    ctx: CallContext,
    _marker: PhantomData<fn() -> Resp>,
}

impl<Resp: DeserializeOwned> ResponseStream<Resp> {
    /// Next response, or `None` once the peer has finished.
    pub async fn next(&mut self) -> Option<CallOutcome<Resp>> {
        let inner = self.inner.as_mut()?;
        let codec = self.codec;

        let item = tokio::select! {
            biased;
            failure = self.ctx.done() => Some(Err(failure)),
            item = inner.next() => item.map(|r| r.map_err(CallFailure::from).and_then(|p| codec.decode(p))),
        };

        if !matches!(item, Some(Ok(_))) {
            self.inner = None;
        }
        item
    }

    /// Drain the stream, stopping at the first failure.
    pub async fn collect_all(mut self) -> CallOutcome<Vec<Resp>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await {
            items.push(item?);
        }
        Ok(items)
    }
}

impl<Resp> fmt::Debug for ResponseStream<Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseStream").field("finished", &self.inner.is_none()).finish()
    }
}
