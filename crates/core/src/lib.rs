//! # rpcshield Core
//!
//! The client runtime: everything between an application call and the
//! transport.
//!
//! This crate contains:
//! - [`CallContext`]: cancellation plus an optional absolute deadline
//! - [`Transport`]: the port the runtime sends encoded payloads through
//! - [`CallChannel`]: typed invocation in all four call shapes
//! - Stream sessions and the [`StreamCoordinator`] for client and bidi streams
//! - [`Middleware`] stages and the [`Endpoint`] pipeline that orders them
//! - [`EntityStore`]: the port for the record storage collaborator
//!
//! ## Architecture Principles
//! - Depends only on `rpcshield-common` and `rpcshield-domain`
//! - No sockets, no files, no globals
//! - All external dependencies via traits

pub mod channel;
pub mod context;
pub mod endpoint;
pub mod middleware;
pub mod store;
pub mod stream;
pub mod transport;

pub use channel::{CallChannel, ResponseStream};
pub use context::CallContext;
pub use endpoint::{
    BidiCall, ClientStreamCall, Endpoint, EndpointBuilder, ServerStreamCall, UnaryCall,
};
pub use middleware::{
    CircuitBreakerLayer, DeadlineLayer, Invoke, Middleware, RateLimitLayer, RetryLayer,
    RetryableKinds, Stage,
};
pub use store::{page_of, EntityStore};
pub use stream::{
    BidiReport, BidiSession, ClientStreamSession, Pacing, RecvHalf, SendHalf, StreamCoordinator,
};
pub use transport::{Payload, PayloadStream, StreamHandle, Transport};
