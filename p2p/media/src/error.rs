//! Error types for media operations.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MediaError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// The access unit is malformed; the decoder skips it.
    #[error("corrupt access unit: {0}")]
    CorruptUnit(String),
    #[error("codec error: {0}")]
    Codec(String),
    #[error("render surface error: {0}")]
    Surface(String),
    #[error("no render surface registered for texture {0}")]
    SurfaceNotRegistered(i64),
    #[error("render surface for texture {0} is already leased")]
    SurfaceBusy(i64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            MediaError::SurfaceNotRegistered(42).to_string(),
            "no render surface registered for texture 42"
        );
        assert_eq!(
            MediaError::CorruptUnit("forbidden bit set".into()).to_string(),
            "corrupt access unit: forbidden bit set"
        );
    }
}
