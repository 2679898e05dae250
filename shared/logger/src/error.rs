//! Error types for logging operations.

use std::io;
use thiserror::Error;

/// Result type for logging operations.
pub type Result<T> = std::result::Result<T, LoggingError>;

/// Errors that can occur while setting up a logger.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// I/O error from file operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The writer thread could not be started.
    #[error("Logging error: {0}")]
    Logging(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_logging_error_display() {
        let err = LoggingError::Logging("writer thread refused to start".to_string());
        assert_eq!(
            err.to_string(),
            "Logging error: writer thread refused to start"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = Error::new(ErrorKind::PermissionDenied, "read-only filesystem");
        let logging_err: LoggingError = io_err.into();

        assert!(matches!(logging_err, LoggingError::Io(_)));
        assert!(logging_err.to_string().contains("read-only filesystem"));
    }
}
