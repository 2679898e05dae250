//! Log file writer running on its own thread.

use crate::error::{LoggingError, Result};
use crate::log_message::LogMessage;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};

/// Appends records to the log file until every sender is gone.
pub(crate) struct LogWriter {
    file: File,
    written: u64,
}

impl LogWriter {
    /// Opens the file in append mode, creating parent directories first.
    pub fn new(log_path: &Path) -> Result<Self> {
        if let Some(parent) = log_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;
        Ok(Self { file, written: 0 })
    }

    fn write_message(&mut self, message: &LogMessage) {
        if let Err(e) = self.file.write_all(message.format().as_bytes()) {
            eprintln!("Error writing log: {}", e);
            return;
        }
        self.written += 1;
        if let Err(e) = self.file.flush() {
            eprintln!("Error flushing log: {}", e);
        }
    }

    fn run(mut self, receiver: Receiver<LogMessage>) -> u64 {
        for message in receiver {
            self.write_message(&message);
        }
        self.written
    }
}

/// Spawns the `log-writer` thread. The thread returns the number of records
/// written once the last sender is dropped.
pub(crate) fn spawn_writer_thread(
    log_path: &Path,
    receiver: Receiver<LogMessage>,
) -> Result<JoinHandle<u64>> {
    let writer = LogWriter::new(log_path)?;
    thread::Builder::new()
        .name("log-writer".to_string())
        .spawn(move || writer.run(receiver))
        .map_err(|e| LoggingError::Logging(format!("cannot spawn writer: {}", e)))
}
