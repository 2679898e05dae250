//! Engine configuration document
//!
//! ```json
//! {
//!   "signaling":   { "broker_host": "broker.local", "broker_port": 1883 },
//!   "negotiation": { "direct_timeout_ms": 3000, "relay_timeout_ms": 5000 },
//!   "transport":   { "keepalive_interval_ms": 2000, "dead_policy": "reconnect" },
//!   "pipeline":    { "frame_queue_capacity": 30 },
//!   "logging":     { "log_level": "info" }
//! }
//! ```

use crate::config::LoggingConfig;
use crate::error::Result;
use config_loader::ConfigError;
use network::ChannelConfig;
use serde::{Deserialize, Serialize};
use signaling::SignalingConfig;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

/// File searched for when no explicit path is given.
pub const CONFIG_FILE_NAME: &str = "p2p_video.json";

/// Path negotiation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// Local UDP socket used for candidates, probes and the media channel.
    pub bind_address: String,
    /// Address advertised as the host candidate instead of the detected one.
    pub host_address: Option<String>,
    pub stun_servers: Vec<String>,
    pub stun_timeout_ms: u64,
    pub direct_timeout_ms: u64,
    pub relay_timeout_ms: u64,
    /// How long to wait for the peer's answer.
    pub answer_timeout_ms: u64,
    /// Extra attempts after a timeout.
    pub max_retries: u32,
    /// Local codec preference, most preferred first.
    pub codecs: Vec<String>,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:0".to_string(),
            host_address: None,
            stun_servers: Vec::new(),
            stun_timeout_ms: 1500,
            direct_timeout_ms: 3000,
            relay_timeout_ms: 5000,
            answer_timeout_ms: 10_000,
            max_retries: 2,
            codecs: vec!["H264".to_string()],
        }
    }
}

impl NegotiationConfig {
    pub fn with_bind_address(mut self, address: &str) -> Self {
        self.bind_address = address.to_string();
        self
    }

    pub fn with_host_address(mut self, address: &str) -> Self {
        self.host_address = Some(address.to_string());
        self
    }

    pub fn with_timeouts(mut self, direct: Duration, relay: Duration, answer: Duration) -> Self {
        self.direct_timeout_ms = direct.as_millis() as u64;
        self.relay_timeout_ms = relay.as_millis() as u64;
        self.answer_timeout_ms = answer.as_millis() as u64;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_codecs(mut self, codecs: &[&str]) -> Self {
        self.codecs = codecs.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn direct_timeout(&self) -> Duration {
        Duration::from_millis(self.direct_timeout_ms)
    }

    pub fn relay_timeout(&self) -> Duration {
        Duration::from_millis(self.relay_timeout_ms)
    }

    pub fn answer_timeout(&self) -> Duration {
        Duration::from_millis(self.answer_timeout_ms)
    }

    pub fn stun_timeout(&self) -> Duration {
        Duration::from_millis(self.stun_timeout_ms)
    }

    /// Parsed `host_address`; unparseable values fall back to detection.
    pub fn host_ip(&self) -> Option<IpAddr> {
        self.host_address.as_deref().and_then(|a| a.parse().ok())
    }
}

/// What the manager does when the transport channel dies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeadPolicy {
    /// Reopen the channel as a new generation, up to `max_reconnects` times.
    Reconnect,
    Teardown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    #[serde(flatten)]
    pub channel: ChannelConfig,
    pub dead_policy: DeadPolicy,
    pub max_reconnects: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            dead_policy: DeadPolicy::Reconnect,
            max_reconnects: 3,
        }
    }
}

impl TransportConfig {
    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_dead_policy(mut self, policy: DeadPolicy, max_reconnects: u32) -> Self {
        self.dead_policy = policy;
        self.max_reconnects = max_reconnects;
        self
    }
}

/// Decode pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Jitter depth for unknown decode modes.
    pub default_jitter_depth: usize,
    pub frame_queue_capacity: usize,
    pub fps: u32,
    pub stall_timeout_ms: u64,
    pub no_frame_log_ms: u64,
    /// Decode to I420 in software (requires the `ffmpeg` feature).
    pub software_decode: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_jitter_depth: 16,
            frame_queue_capacity: 30,
            fps: 30,
            stall_timeout_ms: 5000,
            no_frame_log_ms: 3000,
            software_decode: false,
        }
    }
}

impl PipelineConfig {
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_frame_queue_capacity(mut self, capacity: usize) -> Self {
        self.frame_queue_capacity = capacity;
        self
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }

    pub fn no_frame_log_interval(&self) -> Duration {
        Duration::from_millis(self.no_frame_log_ms)
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub signaling: SignalingConfig,
    pub negotiation: NegotiationConfig,
    pub transport: TransportConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
    pub command_queue_capacity: usize,
    pub event_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            signaling: SignalingConfig::default(),
            negotiation: NegotiationConfig::default(),
            transport: TransportConfig::default(),
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
            command_queue_capacity: 64,
            event_queue_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Loads the configuration.
    ///
    /// # Arguments
    ///
    /// * `path` - Explicit file; `None` searches for [`CONFIG_FILE_NAME`]
    ///   and uses the defaults when it is nowhere to be found
    ///
    /// # Errors
    ///
    /// Returns `Config` if the file cannot be read or is not valid JSON.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Ok(config_loader::load_json(path)?),
            None => match config_loader::find_and_parse(CONFIG_FILE_NAME) {
                Ok(config) => Ok(config),
                Err(ConfigError::FileNotFound(_)) => Ok(Self::default()),
                Err(e) => Err(e.into()),
            },
        }
    }

    pub fn with_signaling(mut self, signaling: SignalingConfig) -> Self {
        self.signaling = signaling;
        self
    }

    pub fn with_negotiation(mut self, negotiation: NegotiationConfig) -> Self {
        self.negotiation = negotiation;
        self
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    pub fn with_command_queue_capacity(mut self, capacity: usize) -> Self {
        self.command_queue_capacity = capacity;
        self
    }
}
