//! Error types for candidate handling and path probing.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IceError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IceError {
    #[error("invalid candidate: {0}")]
    InvalidCandidate(String),
    #[error("invalid candidate type: {0}")]
    InvalidCandidateType(String),
    #[error("socket error: {0}")]
    Socket(String),
    #[error("STUN query failed: {0}")]
    StunFailed(String),
    #[error("no candidate answered within {0:?}")]
    ConnectivityTimeout(std::time::Duration),
    #[error("connectivity check cancelled")]
    Cancelled,
    #[error("no candidates to probe")]
    NoCandidates,
}

impl From<std::io::Error> for IceError {
    fn from(err: std::io::Error) -> Self {
        IceError::Socket(err.to_string())
    }
}
