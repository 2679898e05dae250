use thiserror::Error;

/// Result type used across the loader.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while locating, reading or parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No candidate location held the file.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// The file exists but could not be read.
    #[error("cannot read configuration file: {0}")]
    ReadError(String),

    /// The file content is not valid JSON for the requested type.
    #[error("invalid configuration in {origin}: {message}")]
    ParseError { origin: String, message: String },
}
