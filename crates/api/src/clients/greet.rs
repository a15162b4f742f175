//! Greet service client
//!
//! Each RPC runs through its own resilient endpoint. Streaming RPCs guard
//! establishment only; the [`StreamCoordinator`] then drives the session.

use std::time::Duration;

use rpcshield_core::{
    BidiSession, CallContext, ClientStreamSession, Endpoint, Pacing, ResponseStream,
    StreamCoordinator,
};
use rpcshield_domain::constants::{
    METHOD_GREET, METHOD_GREET_EVERYONE, METHOD_GREET_MANY_TIMES, METHOD_GREET_WITH_DEADLINE,
    METHOD_LONG_GREET,
};
use rpcshield_domain::{
    CallOutcome, GreetEveryoneRequest, GreetEveryoneResponse, GreetManyTimesRequest,
    GreetManyTimesResponse, GreetRequest, GreetResponse, GreetWithDeadlineRequest,
    GreetWithDeadlineResponse, Greeting, LongGreetRequest, LongGreetResponse, Result,
};
use tracing::{info, instrument};

use crate::context::EndpointFactory;

type LongGreetSession = ClientStreamSession<LongGreetRequest, LongGreetResponse>;
type GreetEveryoneSession = BidiSession<GreetEveryoneRequest, GreetEveryoneResponse>;

/// Typed calls to the greet service.
#[derive(Clone)]
pub struct GreetClient {
    greet: Endpoint<GreetRequest, GreetResponse>,
    greet_many_times: Endpoint<GreetManyTimesRequest, ResponseStream<GreetManyTimesResponse>>,
    long_greet: Endpoint<(), LongGreetSession>,
    greet_everyone: Endpoint<(), GreetEveryoneSession>,
    greet_with_deadline: Endpoint<GreetWithDeadlineRequest, GreetWithDeadlineResponse>,
    coordinator: StreamCoordinator,
}

impl GreetClient {
    /// Build every greet endpoint from `endpoints`.
    pub fn new(endpoints: &EndpointFactory) -> Result<Self> {
        Ok(Self {
            greet: endpoints.unary(METHOD_GREET)?,
            greet_many_times: endpoints.server_stream(METHOD_GREET_MANY_TIMES)?,
            long_greet: endpoints.client_stream(METHOD_LONG_GREET)?,
            greet_everyone: endpoints.bidi(METHOD_GREET_EVERYONE)?,
            greet_with_deadline: endpoints.unary(METHOD_GREET_WITH_DEADLINE)?,
            coordinator: StreamCoordinator::default(),
        })
    }

    /// Delay between consecutive sends on client and bidi streams.
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.coordinator = StreamCoordinator::new(pacing);
        self
    }

    /// One greeting for `greeting`.
    #[instrument(skip_all, fields(first_name = %greeting.first_name))]
    pub async fn greet(&self, ctx: &CallContext, greeting: Greeting) -> CallOutcome<String> {
        let response = self.greet.invoke(ctx, GreetRequest { greeting }).await?;
        Ok(response.result)
    }

    /// Open the response stream; items arrive lazily.
    pub async fn greet_many_times(
        &self,
        ctx: &CallContext,
        greeting: Greeting,
    ) -> CallOutcome<ResponseStream<GreetManyTimesResponse>> {
        self.greet_many_times.invoke(ctx, GreetManyTimesRequest { greeting }).await
    }

    /// Send one greeting per name and return the peer's aggregate.
    #[instrument(skip_all)]
    pub async fn long_greet<I>(&self, ctx: &CallContext, first_names: I) -> CallOutcome<String>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let requests: Vec<_> = first_names
            .into_iter()
            .map(|name| LongGreetRequest { greeting: Greeting::first_only(name) })
            .collect();

        let session = self.long_greet.invoke(ctx, ()).await?;
        let response = self.coordinator.run_client_stream(session, requests).await?;
        Ok(response.result)
    }

    /// Greet every name over one bidi stream and collect the replies in
    /// arrival order.
    #[instrument(skip_all)]
    pub async fn greet_everyone<I>(
        &self,
        ctx: &CallContext,
        first_names: I,
    ) -> CallOutcome<Vec<String>>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let requests: Vec<_> = first_names
            .into_iter()
            .map(|name| GreetEveryoneRequest { greeting: Greeting::first_only(name) })
            .collect();

        let session = self.greet_everyone.invoke(ctx, ()).await?;
        let report = self.coordinator.run_bidi(session, requests).await;
        report.outcome()?;

        info!(sent = report.sent, received = report.responses.len(), "greet everyone complete");
        Ok(report.responses.into_iter().map(|response| response.result).collect())
    }

    /// Greet with a caller-chosen deadline, tighter than the call timeout.
    #[instrument(skip_all, fields(timeout = ?timeout))]
    pub async fn greet_with_deadline(
        &self,
        ctx: &CallContext,
        greeting: Greeting,
        timeout: Duration,
    ) -> CallOutcome<String> {
        let ctx = ctx.with_timeout(timeout);
        let response =
            self.greet_with_deadline.invoke(&ctx, GreetWithDeadlineRequest { greeting }).await?;
        Ok(response.result)
    }
}
