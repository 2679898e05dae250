//! Session negotiation
//!
//! Agrees on a codec with the remote device over signaling and proves a
//! UDP path to it: direct first, then through the device's relay.
//!
//! The steps are split along two seams so the session manager can be
//! driven without a network:
//!
//! - [`PathProber`] runs the direct and relayed probes;
//! - [`Negotiator`] is the whole exchange, offer to proven path.

pub mod codec;
pub mod descriptor;
pub mod negotiator;
pub mod path;
pub mod retry;

pub use codec::{Codec, select_codec};
pub use descriptor::{DecodeMode, DisplayMode, PathKind, TransportDescriptor};
pub use negotiator::{
    Negotiated, NegotiationContext, NegotiationRequest, Negotiator, SignalingNegotiator,
};
pub use path::{PathProber, ProvenPath, UdpProber, negotiate_path};
pub use retry::negotiate_with_retry;

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, NegotiationError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    /// No answer or no path within the window. Retried a bounded number of times.
    #[error("negotiation timed out after {0:?}")]
    Timeout(Duration),
    #[error("no common capability: {0}")]
    NoCommonCapability(String),
    #[error("negotiation cancelled")]
    Cancelled,
    #[error("signaling failed during negotiation: {0}")]
    Signaling(String),
    /// The device answered the offer with a bye.
    #[error("peer rejected the session: {0}")]
    Rejected(String),
    #[error("negotiation socket error: {0}")]
    Io(String),
}

impl NegotiationError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, NegotiationError::Timeout(_))
    }
}

impl From<ice::IceError> for NegotiationError {
    fn from(err: ice::IceError) -> Self {
        match err {
            ice::IceError::ConnectivityTimeout(timeout) => NegotiationError::Timeout(timeout),
            ice::IceError::Cancelled => NegotiationError::Cancelled,
            other => NegotiationError::Io(other.to_string()),
        }
    }
}

impl From<signaling::SignalingError> for NegotiationError {
    fn from(err: signaling::SignalingError) -> Self {
        NegotiationError::Signaling(err.to_string())
    }
}

impl From<std::io::Error> for NegotiationError {
    fn from(err: std::io::Error) -> Self {
        NegotiationError::Io(err.to_string())
    }
}
