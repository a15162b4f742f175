//! Async testing utilities
//!
//! Everything here reads tokio's clock, so it behaves the same with real
//! time and with `start_paused = true`.

#![allow(clippy::missing_errors_doc)]

use std::future::Future;
use std::time::Duration;

/// Wait for a future to complete with a timeout, returning a Result
pub async fn timeout_ok<F, T>(duration: Duration, fut: F) -> Result<T, tokio::time::error::Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, fut).await
}
