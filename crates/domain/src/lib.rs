//! # rpcshield Domain
//!
//! Domain types shared by every rpcshield crate.
//!
//! This crate contains:
//! - Greet and blog message types carried over the RPC connection
//! - The call outcome taxonomy (`CallFailure`, `FailureKind`)
//! - Configuration structures for the client runtime
//! - Domain error types and Result definitions
//!
//! ## Architecture
//! - No dependencies on other rpcshield crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod blog;
pub mod config;
pub mod constants;
pub mod errors;
pub mod greet;
pub mod macros;
pub mod outcome;

// Re-export commonly used items
pub use blog::*;
pub use config::*;
pub use errors::*;
pub use greet::*;
pub use outcome::*;
