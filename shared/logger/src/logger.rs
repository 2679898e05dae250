//! Thread-safe asynchronous logger.
//!
//! This module provides the main [`Logger`] interface. Records are filtered by
//! level on the calling thread and then handed to the configured sinks; file
//! output never blocks the caller.

use crate::error::Result;
use crate::log_level::LogLevel;
use crate::log_message::LogMessage;
use crate::log_writer::spawn_writer_thread;
use std::path::PathBuf;
use std::sync::mpsc::{Sender, channel};
use std::sync::{Arc, Mutex};

/// In-memory sink holding every formatted record, newest last.
///
/// Cloning shares the same buffer.
#[derive(Clone, Default)]
pub struct LogCapture {
    lines: Arc<Mutex<Vec<String>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the captured lines.
    pub fn lines(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Whether any captured line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lock().iter().any(|line| line.contains(needle))
    }

    /// Number of captured lines containing `needle`.
    pub fn count_matching(&self, needle: &str) -> usize {
        self.lock().iter().filter(|line| line.contains(needle)).count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn push(&self, line: String) {
        self.lock().push(line);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Destinations shared by a logger and all of its component loggers.
struct Sinks {
    file: Option<Sender<LogMessage>>,
    console: bool,
    capture: Option<LogCapture>,
}

/// Thread-safe, non-blocking logger.
///
/// Cloneable instances share the same sinks.
///
/// # Examples
///
/// ```
/// use logging::{LogLevel, Logger};
///
/// let (logger, capture) = Logger::capturing(LogLevel::Info);
/// let signaling = logger.for_component("SIGNALING");
/// signaling.info("connected to broker");
/// assert!(capture.contains("[SIGNALING]"));
/// ```
#[derive(Clone)]
pub struct Logger {
    sinks: Arc<Sinks>,
    level: LogLevel,
    component: Option<String>,
}

impl Logger {
    /// Creates a logger writing to `log_path` through a dedicated thread.
    ///
    /// # Errors
    ///
    /// Returns error if the log file cannot be created or opened.
    pub fn new(log_path: PathBuf, level: LogLevel) -> Result<Self> {
        Self::builder().level(level).file(log_path).build()
    }

    /// Creates a logger that only prints to stdout.
    pub fn console(level: LogLevel) -> Self {
        Self::from_sinks(
            Sinks {
                file: None,
                console: true,
                capture: None,
            },
            level,
            None,
        )
    }

    /// Creates a logger recording into memory, returning the capture handle.
    pub fn capturing(level: LogLevel) -> (Self, LogCapture) {
        let capture = LogCapture::new();
        let logger = Self::from_sinks(
            Sinks {
                file: None,
                console: false,
                capture: Some(capture.clone()),
            },
            level,
            None,
        );
        (logger, capture)
    }

    /// Creates a logger that discards everything.
    pub fn disabled() -> Self {
        Self::from_sinks(
            Sinks {
                file: None,
                console: false,
                capture: None,
            },
            LogLevel::Error,
            None,
        )
    }

    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::default()
    }

    /// Creates a logger tagged with `component` that shares this logger's
    /// sinks and level.
    ///
    /// # Examples
    ///
    /// ```
    /// use logging::{LogLevel, Logger};
    ///
    /// let root = Logger::console(LogLevel::Info);
    /// let transport = root.for_component("TRANSPORT");
    /// transport.debug("suppressed at info level");
    /// ```
    pub fn for_component(&self, component: &str) -> Self {
        Self {
            sinks: Arc::clone(&self.sinks),
            level: self.level,
            component: Some(component.to_string()),
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn component(&self) -> Option<&str> {
        self.component.as_deref()
    }

    /// Whether a record at `level` would reach the sinks.
    pub fn is_enabled(&self, level: LogLevel) -> bool {
        level >= self.level
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    fn from_sinks(sinks: Sinks, level: LogLevel, component: Option<String>) -> Self {
        Self {
            sinks: Arc::new(sinks),
            level,
            component,
        }
    }

    fn log(&self, level: LogLevel, message: &str) {
        if !self.is_enabled(level) {
            return;
        }
        let msg = LogMessage::new(level, self.component.as_deref(), message);

        if self.sinks.console {
            print!("{}", msg.format());
        }
        if let Some(capture) = &self.sinks.capture {
            capture.push(msg.format());
        }
        if let Some(sender) = &self.sinks.file {
            // The writer thread only goes away with the last sender.
            let _ = sender.send(msg);
        }
    }
}

/// Assembles a [`Logger`] from optional sinks.
#[derive(Default)]
pub struct LoggerBuilder {
    level: LogLevel,
    file: Option<PathBuf>,
    console: bool,
    capture: Option<LogCapture>,
    component: Option<String>,
}

impl LoggerBuilder {
    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn file(mut self, path: PathBuf) -> Self {
        self.file = Some(path);
        self
    }

    pub fn console(mut self, enabled: bool) -> Self {
        self.console = enabled;
        self
    }

    pub fn capture(mut self, capture: &LogCapture) -> Self {
        self.capture = Some(capture.clone());
        self
    }

    pub fn component(mut self, component: &str) -> Self {
        self.component = Some(component.to_string());
        self
    }

    /// Builds the logger, starting the file writer thread when a file sink
    /// was requested.
    ///
    /// # Errors
    ///
    /// Returns error if the log file cannot be opened or the writer thread
    /// cannot be spawned.
    pub fn build(self) -> Result<Logger> {
        let file = match self.file {
            Some(path) => {
                let (sender, receiver) = channel();
                spawn_writer_thread(&path, receiver)?;
                Some(sender)
            }
            None => None,
        };
        Ok(Logger::from_sinks(
            Sinks {
                file,
                console: self.console,
                capture: self.capture,
            },
            self.level,
            self.component,
        ))
    }
}
