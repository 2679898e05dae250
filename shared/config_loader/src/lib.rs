//! # Config Loader
//!
//! Locates configuration files on disk and deserializes their JSON content
//! into any `serde` type.
//!
//! ```no_run
//! use config_loader::{find_and_parse, load_json};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Broker {
//!     host: String,
//!     port: u16,
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Search the usual locations
//!     let broker: Broker = find_and_parse("broker.json")?;
//!
//!     // Or point at a file directly
//!     let broker: Broker = load_json("./config/broker.json")?;
//!     println!("{}:{}", broker.host, broker.port);
//!     Ok(())
//! }
//! ```

pub mod error;

pub use error::{ConfigError, Result};

use serde::de::DeserializeOwned;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the search path.
pub const CONFIG_PATH_ENV: &str = "P2P_VIDEO_CONFIG";

/// Reads the content of a configuration file.
///
/// # Errors
///
/// `FileNotFound` when the path does not exist, `ReadError` when reading fails.
pub fn load_config_file<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    fs::read_to_string(path).map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))
}

/// Finds a configuration file in the usual locations.
///
/// Search order:
/// 1. The `P2P_VIDEO_CONFIG` environment variable (when it names an existing file)
/// 2. `./config/{filename}`
/// 3. `./{filename}`
pub fn find_config_file(filename: &str) -> Result<PathBuf> {
    let env_override = env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
    find_in(filename, env_override, Path::new("."))
}

fn find_in(filename: &str, env_override: Option<PathBuf>, base: &Path) -> Result<PathBuf> {
    if let Some(path) = env_override
        && path.is_file()
    {
        return Ok(path);
    }

    let candidates = [base.join("config").join(filename), base.join(filename)];
    for candidate in candidates {
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found. Searched: {} env var, {}/config/{}, {}/{}",
        filename,
        CONFIG_PATH_ENV,
        base.display(),
        filename,
        base.display(),
        filename
    )))
}

/// Finds and reads a configuration file in one step.
pub fn find_and_load(filename: &str) -> Result<String> {
    let path = find_config_file(filename)?;
    load_config_file(path)
}

/// Deserializes JSON `content`; `origin` names the source in error messages.
pub fn parse_json<T: DeserializeOwned>(content: &str, origin: &str) -> Result<T> {
    serde_json::from_str(content).map_err(|e| ConfigError::ParseError {
        origin: origin.to_string(),
        message: e.to_string(),
    })
}

/// Reads and deserializes a JSON configuration file.
pub fn load_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let path = path.as_ref();
    let content = load_config_file(path)?;
    parse_json(&content, &path.display().to_string())
}

/// Finds, reads and deserializes a JSON configuration file.
pub fn find_and_parse<T: DeserializeOwned>(filename: &str) -> Result<T> {
    let path = find_config_file(filename)?;
    load_json(path)
}
