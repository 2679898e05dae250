//! Channel tuning

use crate::error::{Result, TransportError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Used when no negotiated socket is handed over.
    pub bind_address: String,
    pub keepalive_interval_ms: u64,
    pub max_missed_acks: u32,
    pub reorder_window: usize,
    pub recv_queue: usize,
    pub send_queue: usize,
    pub nack_enabled: bool,
    /// Sent media packets kept for retransmission.
    pub history_size: usize,
    pub max_payload_size: usize,
    pub poll_interval_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:0".to_string(),
            keepalive_interval_ms: 2000,
            max_missed_acks: 3,
            reorder_window: 64,
            recv_queue: 256,
            send_queue: 64,
            nack_enabled: true,
            history_size: 512,
            max_payload_size: 1200,
            poll_interval_ms: 20,
        }
    }
}

impl ChannelConfig {
    pub fn with_keepalive(mut self, interval: Duration, max_missed_acks: u32) -> Self {
        self.keepalive_interval_ms = interval.as_millis() as u64;
        self.max_missed_acks = max_missed_acks;
        self
    }

    pub fn with_reorder_window(mut self, window: usize) -> Self {
        self.reorder_window = window;
        self
    }

    pub fn with_nack(mut self, enabled: bool) -> Self {
        self.nack_enabled = enabled;
        self
    }

    pub fn with_bind_address(mut self, address: &str) -> Self {
        self.bind_address = address.to_string();
        self
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.clamp(1, 50))
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind_address.parse().map_err(|e| {
            TransportError::Io(format!("invalid bind address {:?}: {}", self.bind_address, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ChannelConfig =
            serde_json::from_str(r#"{"keepalive_interval_ms":500,"nack_enabled":false}"#).unwrap();
        assert_eq!(config.keepalive_interval(), Duration::from_millis(500));
        assert!(!config.nack_enabled);
        assert_eq!(config.max_missed_acks, 3);
        assert_eq!(config.reorder_window, 64);
    }

    #[test]
    fn test_poll_interval_is_bounded() {
        let mut config = ChannelConfig::default();
        config.poll_interval_ms = 0;
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
        config.poll_interval_ms = 500;
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_bind_addr_parse_error() {
        let config = ChannelConfig::default().with_bind_address("not-an-address");
        assert!(matches!(config.bind_addr(), Err(TransportError::Io(_))));
    }
}
