//! A single formatted log record.

use crate::log_level::LogLevel;
use chrono::Local;

/// Internal representation of a log record.
#[derive(Debug, Clone)]
pub(crate) struct LogMessage {
    pub timestamp: String,
    pub level: LogLevel,
    pub component: Option<String>,
    pub thread: Option<String>,
    pub message: String,
}

impl LogMessage {
    /// Stamps a record with the local time and the calling thread's name.
    pub fn new(level: LogLevel, component: Option<&str>, message: &str) -> Self {
        Self {
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            level,
            component: component.map(str::to_string),
            thread: std::thread::current().name().map(str::to_string),
            message: message.to_string(),
        }
    }

    /// Formats the record as one line:
    /// `[timestamp] LEVEL [component] (thread): message`
    pub fn format(&self) -> String {
        let mut line = format!("[{}] {}", self.timestamp, self.level.as_str());
        if let Some(component) = &self.component {
            line.push_str(&format!(" [{}]", component));
        }
        if let Some(thread) = &self.thread {
            line.push_str(&format!(" ({})", thread));
        }
        line.push_str(": ");
        line.push_str(&self.message);
        line.push('\n');
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_with_component() {
        let msg = LogMessage::new(LogLevel::Warn, Some("SIGNALING"), "broker dropped");
        let line = msg.format();

        assert!(line.contains("WARN [SIGNALING]"));
        assert!(line.ends_with("broker dropped\n"));
    }

    #[test]
    fn test_format_without_component() {
        let msg = LogMessage {
            timestamp: "2024-01-01 00:00:00.000".to_string(),
            level: LogLevel::Info,
            component: None,
            thread: None,
            message: "ready".to_string(),
        };

        assert_eq!(msg.format(), "[2024-01-01 00:00:00.000] INFO: ready\n");
    }

    #[test]
    fn test_timestamp_has_millis() {
        let msg = LogMessage::new(LogLevel::Info, None, "x");
        // YYYY-MM-DD HH:MM:SS.mmm
        assert_eq!(msg.timestamp.len(), 23);
        assert_eq!(&msg.timestamp[19..20], ".");
    }
}
