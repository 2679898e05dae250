//! Thread-safe asynchronous logging shared by every engine crate.
//!
//! A [`Logger`] fans each record out to up to three sinks: a log file written
//! by a dedicated thread, the console, and an in-memory [`LogCapture`].
//! Component loggers created with [`Logger::for_component`] share the sinks of
//! their parent.

pub mod error;
mod log_level;
mod log_message;
mod log_writer;
mod logger;

pub use error::{LoggingError, Result};
pub use log_level::LogLevel;
pub use logger::{LogCapture, Logger, LoggerBuilder};
