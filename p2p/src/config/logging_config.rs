use logging::{LogLevel, Logger};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_file_path: String,
    pub log_level: String,
    pub enable_console: bool,
    pub enable_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            log_file_path: "p2p-video.log".to_string(),
            log_level: "info".to_string(),
            enable_console: true,
            enable_file: true,
        }
    }
}

impl LoggingConfig {
    /// Builds the root logger described by this section.
    ///
    /// # Errors
    ///
    /// Returns an error if the log file cannot be opened.
    pub fn build_logger(&self) -> logging::Result<Logger> {
        let mut builder = Logger::builder()
            .level(LogLevel::from_config(&self.log_level))
            .console(self.enable_console);
        if self.enable_file {
            builder = builder.file(PathBuf::from(&self.log_file_path));
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_file_logger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.log");
        let config = LoggingConfig {
            log_file_path: path.to_string_lossy().into_owned(),
            log_level: "debug".to_string(),
            enable_console: false,
            enable_file: true,
        };

        let logger = config.build_logger().unwrap();
        assert_eq!(logger.level(), LogLevel::Debug);
        logger.info("engine starting");
        drop(logger);

        // The writer thread flushes asynchronously.
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        let mut content = String::new();
        while std::time::Instant::now() < deadline {
            content = std::fs::read_to_string(&path).unwrap_or_default();
            if content.contains("engine starting") {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert!(content.contains("engine starting"));
    }

    #[test]
    fn test_partial_section_keeps_defaults() {
        let config: LoggingConfig = serde_json::from_str(r#"{"log_level":"warn"}"#).unwrap();
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.log_file_path, "p2p-video.log");
        assert!(config.enable_file);
    }
}
