//! Signaling connection settings

use crate::backoff::ReconnectPolicy;
use crate::topics::DEFAULT_TOPIC_PREFIX;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Broker address, credentials and queue sizes for one signaling client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// MQTT keep-alive in seconds; `0` disables pings.
    pub keep_alive_secs: u16,
    pub topic_prefix: String,
    /// How long `connect` keeps retrying before reporting `Unreachable`.
    pub connect_timeout_ms: u64,
    pub reconnect: ReconnectPolicy,
    pub inbox_capacity: usize,
    /// Also bounds the publishes buffered while disconnected.
    pub outbound_capacity: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            broker_host: "127.0.0.1".to_string(),
            broker_port: 1883,
            username: None,
            password: None,
            keep_alive_secs: 30,
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            connect_timeout_ms: 5_000,
            reconnect: ReconnectPolicy::default(),
            inbox_capacity: 256,
            outbound_capacity: 64,
        }
    }
}

impl SignalingConfig {
    pub fn with_broker(mut self, host: &str, port: u16) -> Self {
        self.broker_host = host.to_string();
        self.broker_port = port;
        self
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_keep_alive(mut self, secs: u16) -> Self {
        self.keep_alive_secs = secs;
        self
    }

    pub fn broker_address(&self) -> String {
        format!("{}:{}", self.broker_host, self.broker_port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn keep_alive(&self) -> Option<Duration> {
        if self.keep_alive_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.keep_alive_secs as u64))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SignalingConfig::default();
        assert_eq!(config.broker_address(), "127.0.0.1:1883");
        assert_eq!(config.topic_prefix, "yyt");
        assert_eq!(config.keep_alive(), Some(Duration::from_secs(30)));
        assert_eq!(config.reconnect, ReconnectPolicy::default());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: SignalingConfig =
            serde_json::from_str(r#"{"broker_host": "mqtt.local", "keep_alive_secs": 0}"#)
                .unwrap();
        assert_eq!(config.broker_host, "mqtt.local");
        assert_eq!(config.broker_port, 1883);
        assert_eq!(config.keep_alive(), None);
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_builders() {
        let config = SignalingConfig::default()
            .with_broker("10.0.0.2", 2883)
            .with_credentials("app", "secret")
            .with_connect_timeout(Duration::from_millis(300));
        assert_eq!(config.broker_address(), "10.0.0.2:2883");
        assert_eq!(config.username.as_deref(), Some("app"));
        assert_eq!(config.connect_timeout_ms, 300);
    }
}
