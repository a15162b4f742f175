//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::outcome::{CallFailure, FailureKind};

/// Main error type for rpcshield
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum RpcShieldError {
    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The transport could not be set up.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The record store failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Anything else.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for rpcshield operations
pub type Result<T> = std::result::Result<T, RpcShieldError>;

impl From<CallFailure> for RpcShieldError {
    fn from(failure: CallFailure) -> Self {
        match failure.kind {
            FailureKind::NotFound => RpcShieldError::NotFound(failure.detail),
            FailureKind::InvalidArgument => RpcShieldError::InvalidInput(failure.detail),
            FailureKind::Other => RpcShieldError::Internal(failure.detail),
            _ => RpcShieldError::Transport(failure.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_tagging() {
        let err = RpcShieldError::Storage("disk full".into());
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, r#"{"type":"Storage","message":"disk full"}"#);

        let back: RpcShieldError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn test_from_call_failure() {
        let err: RpcShieldError = CallFailure::new(FailureKind::NotFound, "blog 42").into();
        assert_eq!(err, RpcShieldError::NotFound("blog 42".into()));

        let err: RpcShieldError = CallFailure::new(FailureKind::Unavailable, "reset").into();
        assert!(matches!(err, RpcShieldError::Transport(msg) if msg.contains("unavailable")));
    }
}
