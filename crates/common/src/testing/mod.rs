//! Testing utilities and helpers
//!
//! - **[`assertions`]**: duration bounds for timing assertions
//! - **[`async_utils`]**: timeouts for async tests
//!
//! Both work under tokio's paused clock, so timing assertions in
//! `#[tokio::test(start_paused = true)]` tests are exact.
//!
//! ## Usage
//!
//! ```ignore
//! use std::time::Duration;
//!
//! use rpcshield_common::testing::assert_duration_in_range;
//!
//! assert_duration_in_range(
//!     Duration::from_millis(1040),
//!     Duration::from_secs(1),
//!     Duration::from_millis(100),
//! );
//! ```

pub mod assertions;
pub mod async_utils;

pub use assertions::assert_duration_in_range;
pub use async_utils::timeout_ok;
