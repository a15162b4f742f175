//! Per-call context
//!
//! A [`CallContext`] travels with one invocation through every pipeline stage
//! and into the call channel. It carries the caller's cancellation token and
//! an optional absolute [`Deadline`].

use std::time::Duration;

use rpcshield_common::resilience::Deadline;
use rpcshield_domain::CallFailure;
use tokio_util::sync::CancellationToken;

/// Cancellation and deadline scope of one invocation.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Deadline>,
}

impl CallContext {
    /// Fresh context with no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Context cancelled whenever `token` is.
    pub fn with_token(token: CancellationToken) -> Self {
        Self { cancel: token, deadline: None }
    }

    /// Same context with a deadline `timeout` from now, unless the existing
    /// deadline is earlier.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Deadline::after(timeout))
    }

    /// Same context with `deadline`, unless the existing deadline is earlier.
    pub fn with_deadline(&self, deadline: Deadline) -> Self {
        Self { cancel: self.cancel.clone(), deadline: Some(deadline.earliest(self.deadline)) }
    }

    /// Context that is cancelled with this one but can also be cancelled on
    /// its own.
    pub fn child(&self) -> Self {
        Self { cancel: self.cancel.child_token(), deadline: self.deadline }
    }

    /// Absolute deadline, if one was set.
    pub fn deadline(&self) -> Option<Deadline> {
        self.deadline
    }

    /// Token cancelled when this context is.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel this context and every child.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether this context or a parent was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The failure this context has already reached, if any.
    ///
    /// Cancellation wins when both have happened.
    pub fn check(&self) -> Option<CallFailure> {
        if self.cancel.is_cancelled() {
            return Some(CallFailure::cancelled());
        }
        match self.deadline {
            Some(deadline) if deadline.is_expired() => Some(CallFailure::deadline_exceeded()),
            _ => None,
        }
    }

    /// Resolves once the call is cancelled or its deadline passes, with the
    /// matching failure.
    pub async fn done(&self) -> CallFailure {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => CallFailure::cancelled(),
                _ = deadline.sleep() => CallFailure::deadline_exceeded(),
            },
            None => {
                self.cancel.cancelled().await;
                CallFailure::cancelled()
            }
        }
    }
}
