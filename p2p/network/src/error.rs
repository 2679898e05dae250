//! Transport error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The peer stopped acknowledging keepalives.
    #[error("channel generation {generation} dead after {missed_acks} missed keepalive acks")]
    Dead { generation: u32, missed_acks: u32 },
    #[error("transport I/O error: {0}")]
    Io(String),
    #[error("invalid packet: {0}")]
    InvalidPacket(String),
    /// The peer sent a bye.
    #[error("remote peer closed the channel")]
    RemoteBye,
    #[error("channel closed")]
    Closed,
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

impl From<ice::IceError> for TransportError {
    fn from(err: ice::IceError) -> Self {
        TransportError::InvalidPacket(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dead_display() {
        let err = TransportError::Dead {
            generation: 2,
            missed_acks: 3,
        };
        assert_eq!(
            err.to_string(),
            "channel generation 2 dead after 3 missed keepalive acks"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        assert!(matches!(TransportError::from(io), TransportError::Io(msg) if msg == "port taken"));
    }
}
