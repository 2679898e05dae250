use crate::error::LoggingError;
use std::fmt;
use std::str::FromStr;

/// Severity level of a log record.
///
/// Ordered from lowest to highest: Debug < Info < Warn < Error
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    /// Per-packet and per-frame detail.
    Debug,
    /// Lifecycle transitions.
    #[default]
    Info,
    /// Recoverable faults (retries, dropped frames).
    Warn,
    /// Fatal faults surfaced to the caller.
    Error,
}

impl LogLevel {
    /// Returns the upper-case tag written in front of each record.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    /// Parses a level from configuration, falling back to `Info` for
    /// values nobody recognises.
    pub fn from_config(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = LoggingError;

    /// Parses a log level (case-insensitive). `trace` maps to `Debug` and
    /// `warning` to `Warn`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" | "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(LoggingError::Logging(format!(
                "unknown log level '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
    }

    #[test]
    fn test_log_level_parse_aliases() {
        assert_eq!("TRACE".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("Warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(" error ".parse::<LogLevel>().unwrap(), LogLevel::Error);
    }

    #[test]
    fn test_log_level_parse_rejects_unknown() {
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_from_config_falls_back_to_info() {
        assert_eq!(LogLevel::from_config("verbose"), LogLevel::Info);
        assert_eq!(LogLevel::from_config(""), LogLevel::Info);
        assert_eq!(LogLevel::from_config("debug"), LogLevel::Debug);
    }

    #[test]
    fn test_display_matches_tag() {
        assert_eq!(LogLevel::Warn.to_string(), "WARN");
    }
}
