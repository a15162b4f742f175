//! Call outcome taxonomy
//!
//! Every invocation through the client runtime terminates in a
//! [`CallOutcome`]: either the decoded response or a [`CallFailure`] tagged
//! with a [`FailureKind`]. Transport statuses are folded into this taxonomy at
//! the call channel boundary, so nothing above it ever inspects raw status
//! codes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::impl_label_conversions;

/// Classification of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The caller cancelled the call.
    Cancelled,
    /// The call's deadline expired before it completed.
    DeadlineExceeded,
    /// The peer or connection is unavailable.
    Unavailable,
    /// The peer aborted the call (e.g. a conflict); transient.
    Aborted,
    /// The addressed entity does not exist.
    NotFound,
    /// The request was malformed (e.g. an unparsable entity id).
    InvalidArgument,
    /// Rejected locally by the rate limiter; no I/O attempted.
    RateLimited,
    /// Rejected locally by an open circuit breaker; no I/O attempted.
    CircuitOpen,
    /// Anything unclassified.
    Other,
}

impl_label_conversions!(FailureKind {
    Cancelled => "cancelled",
    DeadlineExceeded => "deadline_exceeded",
    Unavailable => "unavailable",
    Aborted => "aborted",
    NotFound => "not_found",
    InvalidArgument => "invalid_argument",
    RateLimited => "rate_limited",
    CircuitOpen => "circuit_open",
    Other => "other",
});

impl FailureKind {
    /// Failures produced before any transport I/O was attempted.
    pub fn is_local(self) -> bool {
        matches!(self, FailureKind::RateLimited | FailureKind::CircuitOpen)
    }

    /// Failures that end the invocation regardless of retry policy.
    pub fn is_terminal(self) -> bool {
        matches!(self, FailureKind::Cancelled | FailureKind::DeadlineExceeded)
    }
}

/// A failed call: its kind plus a human readable detail.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {detail}")]
pub struct CallFailure {
    /// Classification used by retry and breaker decisions.
    pub kind: FailureKind,
    /// Message from the peer or the stage that failed the call.
    pub detail: String,
}

impl CallFailure {
    /// A failure of `kind` described by `detail`.
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self { kind, detail: detail.into() }
    }

    /// The caller cancelled the call.
    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "call cancelled by caller")
    }

    /// The call outlived its deadline.
    pub fn deadline_exceeded() -> Self {
        Self::new(FailureKind::DeadlineExceeded, "deadline exceeded")
    }

    /// `endpoint` had no tokens left.
    pub fn rate_limited(endpoint: &str) -> Self {
        Self::new(FailureKind::RateLimited, format!("rate limit exhausted for {endpoint}"))
    }

    /// `endpoint`'s breaker rejected the call.
    pub fn circuit_open(endpoint: &str) -> Self {
        Self::new(FailureKind::CircuitOpen, format!("circuit open for {endpoint}"))
    }

    /// The failure's kind.
    pub fn kind(&self) -> FailureKind {
        self.kind
    }
}

/// Terminal result of one invocation.
pub type CallOutcome<T> = std::result::Result<T, CallFailure>;

/// Status codes reported by the RPC transport.
///
/// The set mirrors the codes the transport can surface; the call channel is
/// the only place that maps them onto [`FailureKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    /// The operation was cancelled.
    Cancelled,
    /// Unclassified error.
    Unknown,
    /// The request was malformed.
    InvalidArgument,
    /// The deadline passed before completion.
    DeadlineExceeded,
    /// The requested entity does not exist.
    NotFound,
    /// The entity to create already exists.
    AlreadyExists,
    /// A quota or size limit was hit.
    ResourceExhausted,
    /// The operation was aborted, typically by a concurrency conflict.
    Aborted,
    /// The peer broke an invariant.
    Internal,
    /// The peer cannot be reached right now.
    Unavailable,
}

impl_label_conversions!(StatusCode {
    Cancelled => "cancelled",
    Unknown => "unknown",
    InvalidArgument => "invalid_argument",
    DeadlineExceeded => "deadline_exceeded",
    NotFound => "not_found",
    AlreadyExists => "already_exists",
    ResourceExhausted => "resource_exhausted",
    Aborted => "aborted",
    Internal => "internal",
    Unavailable => "unavailable",
});

/// Error status returned by the transport or the remote peer.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct Status {
    /// Canonical code.
    pub code: StatusCode,
    /// Message from the peer.
    pub message: String,
}

impl Status {
    /// A status with `code` and `message`.
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    /// `NotFound` status.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NotFound, message)
    }

    /// `InvalidArgument` status.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StatusCode::InvalidArgument, message)
    }

    /// `Internal` status.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Internal, message)
    }

    /// `Unavailable` status.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unavailable, message)
    }
}

impl From<StatusCode> for FailureKind {
    fn from(code: StatusCode) -> Self {
        match code {
            StatusCode::Cancelled => FailureKind::Cancelled,
            StatusCode::DeadlineExceeded => FailureKind::DeadlineExceeded,
            StatusCode::NotFound => FailureKind::NotFound,
            StatusCode::InvalidArgument => FailureKind::InvalidArgument,
            StatusCode::Aborted => FailureKind::Aborted,
            StatusCode::Unavailable => FailureKind::Unavailable,
            StatusCode::Unknown
            | StatusCode::AlreadyExists
            | StatusCode::ResourceExhausted
            | StatusCode::Internal => FailureKind::Other,
        }
    }
}

impl From<Status> for CallFailure {
    fn from(status: Status) -> Self {
        CallFailure { kind: status.code.into(), detail: status.message }
    }
}
