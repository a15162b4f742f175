//! # rpcshield Infrastructure
//!
//! Infrastructure implementations of core ports plus process setup.
//!
//! This crate contains:
//! - Configuration loading from the environment and TOML/JSON files
//! - Tracing subscriber installation
//! - The in-memory [`EntityStore`](rpcshield_core::EntityStore)
//! - [`InProcessTransport`], a [`Transport`](rpcshield_core::Transport)
//!   serving the greet and blog services with scripted faults
//!
//! ## Architecture
//! - Implements traits defined in `rpcshield-core`
//! - Contains all "impure" code (environment, files, global subscriber)

pub mod config;
pub mod observability;
pub mod storage;
pub mod transport;

pub use observability::{init_tracing, LogFormat};
pub use storage::InMemoryEntityStore;
pub use transport::{Fault, FaultPlan, InProcessTransport, PeerSettings};
