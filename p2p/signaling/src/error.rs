//! Signaling error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SignalingError>;

/// Errors raised by the signaling client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalingError {
    /// The broker refused the phone identity. Never retried.
    #[error("identity rejected by broker: {0}")]
    AuthRejected(String),
    /// The broker could not be reached or the connection was lost.
    #[error("broker unreachable: {0}")]
    Unreachable(String),
    /// The broker sent something that is not valid MQTT 3.1.1.
    #[error("MQTT protocol error: {0}")]
    Protocol(String),
    /// A payload could not be encoded or decoded as a signaling message.
    #[error("invalid signaling message: {0}")]
    InvalidMessage(String),
    /// The outbound queue is full.
    #[error("signaling outbound queue is full")]
    QueueFull,
    /// The client has been shut down.
    #[error("signaling connection closed")]
    Closed,
}

impl SignalingError {
    /// Whether the connection attempt may be repeated after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SignalingError::Unreachable(_))
    }

    /// Whether a dropped session must not be re-opened.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SignalingError::AuthRejected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unreachable_is_retryable() {
        assert!(SignalingError::Unreachable("reset".into()).is_retryable());
        assert!(!SignalingError::AuthRejected("bad credentials".into()).is_retryable());
        assert!(!SignalingError::Protocol("level 3".into()).is_retryable());
        assert!(!SignalingError::Closed.is_retryable());
    }

    #[test]
    fn test_only_auth_rejection_is_fatal() {
        assert!(SignalingError::AuthRejected("not authorized".into()).is_fatal());
        assert!(!SignalingError::Protocol("unexpected SUBACK".into()).is_fatal());
        assert!(!SignalingError::Unreachable("reset".into()).is_fatal());
    }

    #[test]
    fn test_display() {
        let err = SignalingError::AuthRejected("not authorized".to_string());
        assert_eq!(err.to_string(), "identity rejected by broker: not authorized");
    }
}
