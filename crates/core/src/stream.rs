//! Stream sessions and the stream coordinator
//!
//! A session owns the two halves of one open client or bidi stream. The
//! halves are independent: [`SendHalf`] writes the outbound direction and
//! [`RecvHalf`] reads the inbound one, so a slow reader never holds up a
//! writer. Closing the send half is the "no more requests" signal; the peer's
//! end-of-stream shows up as `None` from [`RecvHalf::recv`], never as an
//! error.
//!
//! [`StreamCoordinator`] drives whole exchanges: the client-stream pattern
//! (send everything, close, read one aggregate) and the bidi pattern (send
//! and receive loops on two tasks joined by a completion signal).

use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

use rpcshield_domain::{CallFailure, CallOutcome, FailureKind, Status};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::channel::Codec;
use crate::context::CallContext;
use crate::transport::Payload;

/// Outbound direction of an open stream.
pub struct SendHalf<Req> {
    tx: Option<mpsc::Sender<Payload>>,
    codec: Codec,
    ctx: CallContext,
    sent: usize,
    _marker: PhantomData<fn(Req)>,
}

impl<Req> SendHalf<Req> {
    pub(crate) fn new(tx: mpsc::Sender<Payload>, codec: Codec, ctx: CallContext) -> Self {
        Self { tx: Some(tx), codec, ctx, sent: 0, _marker: PhantomData }
    }

    /// Signal that no more messages follow. Idempotent.
    pub fn close(&mut self) {
        if self.tx.take().is_some() {
            debug!(sent = self.sent, "send half closed");
        }
    }

    /// Whether this side closed its direction.
    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }

    /// Whether the peer stopped reading the outbound direction.
    pub fn peer_closed(&self) -> bool {
        self.tx.as_ref().is_some_and(mpsc::Sender::is_closed)
    }

    /// Messages accepted so far.
    pub fn sent(&self) -> usize {
        self.sent
    }

    /// Context the stream was opened under.
    pub fn context(&self) -> &CallContext {
        &self.ctx
    }
}

impl<Req: Serialize> SendHalf<Req> {
    /// Queue one message for the peer, in submission order.
    pub async fn send(&mut self, message: &Req) -> CallOutcome<()> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(CallFailure::new(FailureKind::Other, "send half already closed"));
        };
        let payload = self.codec.encode(message)?;

        tokio::select! {
            biased;
            failure = self.ctx.done() => return Err(failure),
            sent = tx.send(payload) => sent.map_err(|_| {
                CallFailure::new(FailureKind::Unavailable, "peer closed the stream")
            })?,
        }

        self.sent += 1;
        Ok(())
    }
}

impl<Req> fmt::Debug for SendHalf<Req> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendHalf").field("sent", &self.sent).field("closed", &self.is_closed()).finish()
    }
}

/// Inbound direction of an open stream.
pub struct RecvHalf<Resp> {
    rx: mpsc::Receiver<Result<Payload, Status>>,
    codec: Codec,
    ctx: CallContext,
    received: usize,
    finished: bool,
    _marker: PhantomData<fn() -> Resp>,
}

impl<Resp> RecvHalf<Resp> {
    pub(crate) fn new(
        rx: mpsc::Receiver<Result<Payload, Status>>,
        codec: Codec,
        ctx: CallContext,
    ) -> Self {
        Self { rx, codec, ctx, received: 0, finished: false, _marker: PhantomData }
    }

    /// Messages received so far.
    pub fn received(&self) -> usize {
        self.received
    }

    /// Context the stream was opened under.
    pub fn context(&self) -> &CallContext {
        &self.ctx
    }
}

impl<Resp: DeserializeOwned> RecvHalf<Resp> {
    /// Next message, or `None` once the peer has ended its direction.
    ///
    /// After the first failure or `None` every later call returns `None`.
    pub async fn recv(&mut self) -> Option<CallOutcome<Resp>> {
        if self.finished {
            return None;
        }
        let codec = self.codec;

        let item = tokio::select! {
            biased;
            failure = self.ctx.done() => Some(Err(failure)),
            item = self.rx.recv() => {
                item.map(|r| r.map_err(CallFailure::from).and_then(|p| codec.decode(p)))
            }
        };

        if matches!(item, Some(Ok(_))) {
            self.received += 1;
        } else {
            self.finished = true;
            self.rx.close();
        }
        item
    }
}

impl<Resp> fmt::Debug for RecvHalf<Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecvHalf")
            .field("received", &self.received)
            .field("finished", &self.finished)
            .finish()
    }
}

/// An open client-streaming call: many requests, one aggregate response.
#[derive(Debug)]
pub struct ClientStreamSession<Req, Resp> {
    send: SendHalf<Req>,
    recv: RecvHalf<Resp>,
}

impl<Req, Resp> ClientStreamSession<Req, Resp> {
    pub(crate) fn new(send: SendHalf<Req>, recv: RecvHalf<Resp>) -> Self {
        Self { send, recv }
    }

    /// Context the stream was opened under.
    pub fn context(&self) -> &CallContext {
        self.send.context()
    }

    /// Requests sent so far.
    pub fn sent(&self) -> usize {
        self.send.sent()
    }
}

impl<Req: Serialize, Resp: DeserializeOwned> ClientStreamSession<Req, Resp> {
    /// Send one request.
    ///
    /// A peer that rejects the stream partway through stops reading and
    /// leaves its status on the inbound side; that status is the failure
    /// returned here, not the closed outbound channel.
    pub async fn send(&mut self, message: &Req) -> CallOutcome<()> {
        match self.send.send(message).await {
            Err(failure) if self.send.peer_closed() => Err(self.peer_status(failure).await),
            outcome => outcome,
        }
    }

    async fn peer_status(&mut self, fallback: CallFailure) -> CallFailure {
        self.send.close();
        match self.recv.recv().await {
            Some(Err(failure)) => {
                debug!(kind = %failure.kind, sent = self.send.sent(), "peer rejected the stream");
                failure
            }
            _ => fallback,
        }
    }

    /// Close the send side, then wait for the single aggregate response.
    pub async fn close_and_receive(mut self) -> CallOutcome<Resp> {
        self.send.close();
        match self.recv.recv().await {
            Some(outcome) => outcome,
            None => Err(CallFailure::new(
                FailureKind::Other,
                "stream ended without an aggregate response",
            )),
        }
    }
}

/// An open bidirectional call.
#[derive(Debug)]
pub struct BidiSession<Req, Resp> {
    send: SendHalf<Req>,
    recv: RecvHalf<Resp>,
}

impl<Req, Resp> BidiSession<Req, Resp> {
    pub(crate) fn new(send: SendHalf<Req>, recv: RecvHalf<Resp>) -> Self {
        Self { send, recv }
    }

    /// Separate the halves so they can be driven from different tasks.
    pub fn split(self) -> (SendHalf<Req>, RecvHalf<Resp>) {
        (self.send, self.recv)
    }

    /// Tell the peer no more requests follow.
    pub fn close_send(&mut self) {
        self.send.close();
    }

    /// Context the stream was opened under.
    pub fn context(&self) -> &CallContext {
        self.send.context()
    }
}

impl<Req: Serialize, Resp: DeserializeOwned> BidiSession<Req, Resp> {
    /// Send one request.
    pub async fn send(&mut self, message: &Req) -> CallOutcome<()> {
        self.send.send(message).await
    }

    /// Next response, or `None` once the peer is done.
    pub async fn recv(&mut self) -> Option<CallOutcome<Resp>> {
        self.recv.recv().await
    }
}

/// Delay the application puts between consecutive sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pacing {
    /// Send as fast as the peer accepts.
    #[default]
    Immediate,
    /// Sleep this long before every send but the first.
    Fixed(Duration),
}

impl Pacing {
    async fn wait(self, ctx: &CallContext) -> CallOutcome<()> {
        match self {
            Pacing::Immediate => Ok(()),
            Pacing::Fixed(delay) => tokio::select! {
                biased;
                failure = ctx.done() => Err(failure),
                _ = tokio::time::sleep(delay) => Ok(()),
            },
        }
    }
}

/// What a bidi exchange produced.
#[derive(Debug)]
pub struct BidiReport<Resp> {
    /// Requests the peer accepted.
    pub sent: usize,
    /// Responses in arrival order.
    pub responses: Vec<Resp>,
    /// How the send loop ended.
    pub send_outcome: CallOutcome<()>,
    /// How the receive loop ended.
    pub recv_outcome: CallOutcome<()>,
}

impl<Resp> BidiReport<Resp> {
    /// Overall result; a receive failure takes precedence over a send failure.
    pub fn outcome(&self) -> CallOutcome<()> {
        self.recv_outcome.clone().and(self.send_outcome.clone())
    }
}

/// Drives send and receive loops over stream sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamCoordinator {
    pacing: Pacing,
}

impl StreamCoordinator {
    /// Coordinator that spaces sends by `pacing`.
    pub fn new(pacing: Pacing) -> Self {
        Self { pacing }
    }

    /// Send every request in order, close, and return the aggregate response.
    #[instrument(skip_all, fields(pacing = ?self.pacing))]
    pub async fn run_client_stream<Req, Resp, I>(
        &self,
        mut session: ClientStreamSession<Req, Resp>,
        requests: I,
    ) -> CallOutcome<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
        I: IntoIterator<Item = Req>,
    {
        for (index, request) in requests.into_iter().enumerate() {
            if index > 0 {
                self.pacing.wait(session.context()).await?;
            }
            session.send(&request).await?;
        }
        debug!(sent = session.sent(), "all requests sent");
        session.close_and_receive().await
    }

    /// Run a bidi exchange to completion.
    ///
    /// The send loop and receive loop run as two tasks. The send loop closes
    /// its half after the last request. The receive loop runs until the peer
    /// ends its direction or a failure arrives; a receive failure also stops
    /// the send loop, while a send failure leaves the receive loop draining.
    /// The exchange completes when both loops have finished.
    #[instrument(skip_all, fields(pacing = ?self.pacing))]
    pub async fn run_bidi<Req, Resp, I>(
        &self,
        session: BidiSession<Req, Resp>,
        requests: I,
    ) -> BidiReport<Resp>
    where
        Req: Serialize + Send + Sync + 'static,
        Resp: DeserializeOwned + Send + 'static,
        I: IntoIterator<Item = Req>,
        I::IntoIter: Send + 'static,
    {
        let (mut send, mut recv) = session.split();
        let stop = CancellationToken::new();
        let pacing = self.pacing;

        let send_stop = stop.clone();
        let requests = requests.into_iter();
        let sender = tokio::spawn(async move {
            let ctx = send.context().clone();
            let mut outcome = Ok(());
            for (index, request) in requests.enumerate() {
                let step = async {
                    if index > 0 {
                        pacing.wait(&ctx).await?;
                    }
                    send.send(&request).await
                };
                tokio::select! {
                    biased;
                    _ = send_stop.cancelled() => {
                        debug!("receive loop ended, stopping sends");
                        break;
                    }
                    result = step => {
                        if let Err(failure) = result {
                            warn!(kind = %failure.kind, "send loop failed");
                            outcome = Err(failure);
                            break;
                        }
                    }
                }
            }
            send.close();
            (send.sent(), outcome)
        });

        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(async move {
            let mut responses = Vec::new();
            let outcome = loop {
                match recv.recv().await {
                    Some(Ok(response)) => responses.push(response),
                    None => break Ok(()),
                    Some(Err(failure)) => {
                        warn!(kind = %failure.kind, "receive loop failed");
                        stop.cancel();
                        break Err(failure);
                    }
                }
            };
            let _ = done_tx.send((responses, outcome));
        });

        let (sent, send_outcome) = match sender.await {
            Ok(report) => report,
            Err(join) => {
                (0, Err(CallFailure::new(FailureKind::Other, format!("send loop aborted: {join}"))))
            }
        };
        let (responses, recv_outcome) = done_rx.await.unwrap_or_else(|_| {
            (Vec::new(), Err(CallFailure::new(FailureKind::Other, "receive loop aborted")))
        });

        debug!(sent, received = responses.len(), "bidi exchange complete");
        BidiReport { sent, responses, send_outcome, recv_outcome }
    }
}
