//! Negotiation result and the UI-supplied modes it carries

use super::codec::Codec;
use network::ChannelTarget;
use serde::Serialize;
use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PathKind {
    Direct,
    Relayed,
}

/// How the UI shows the video. Unknown values are carried as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Flutter texture registry.
    Texture,
    /// Native platform view.
    PlatformView,
    Other(i32),
}

impl DisplayMode {
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => DisplayMode::Texture,
            1 => DisplayMode::PlatformView,
            other => DisplayMode::Other(other),
        }
    }

    pub fn as_i32(&self) -> i32 {
        match self {
            DisplayMode::Texture => 0,
            DisplayMode::PlatformView => 1,
            DisplayMode::Other(value) => *value,
        }
    }
}

/// Latency/smoothness trade-off picked by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    LowLatency,
    Balanced,
    Smooth,
    Other(i32),
}

impl DecodeMode {
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => DecodeMode::LowLatency,
            1 => DecodeMode::Balanced,
            2 => DecodeMode::Smooth,
            other => DecodeMode::Other(other),
        }
    }

    pub fn as_i32(&self) -> i32 {
        match self {
            DecodeMode::LowLatency => 0,
            DecodeMode::Balanced => 1,
            DecodeMode::Smooth => 2,
            DecodeMode::Other(value) => *value,
        }
    }

    /// Jitter buffer depth in packets; `default` covers unknown modes.
    pub fn jitter_depth(&self, default: usize) -> usize {
        match self {
            DecodeMode::LowLatency => 4,
            DecodeMode::Balanced => 16,
            DecodeMode::Smooth => 64,
            DecodeMode::Other(_) => default.max(1),
        }
    }
}

/// Everything needed to open the transport channel for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportDescriptor {
    pub session_id: String,
    pub path: PathKind,
    /// Peer address for direct paths, relay address for relayed ones.
    pub endpoint: SocketAddr,
    pub relay_channel: Option<u16>,
    pub codec: Codec,
    pub display_mode: DisplayMode,
    pub decode_mode: DecodeMode,
}

impl TransportDescriptor {
    pub fn channel_target(&self) -> ChannelTarget {
        ChannelTarget {
            endpoint: self.endpoint,
            relay_channel: match self.path {
                PathKind::Direct => None,
                PathKind::Relayed => self.relay_channel,
            },
        }
    }
}
