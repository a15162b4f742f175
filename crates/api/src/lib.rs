//! # rpcshield App
//!
//! Application layer - typed clients and the demo entry point.
//!
//! This crate contains:
//! - Application context (dependency injection)
//! - [`GreetClient`] and [`BlogClient`] over resilient endpoints
//! - The `rpcshield` demo binary
//!
//! ## Architecture
//! - Depends on `common`, `domain`, `core`, and `infra`
//! - Wires configuration, transport and resilience state together once

pub mod clients;
pub mod context;

pub use clients::{BlogClient, GreetClient};
pub use context::{AppContext, EndpointFactory};
