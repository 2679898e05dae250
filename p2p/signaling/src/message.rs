//! Signaling messages exchanged through the broker
//!
//! Messages are JSON objects tagged by `"type"`:
//!
//! ```json
//! {"type":"offer","session_id":"9f2c","from":"phone1",
//!  "hints":{"address":"192.168.1.20","port":40000,"protocols":["udp"],
//!           "codecs":["h264"],"candidates":["1 1 UDP 2130706431 192.168.1.20 40000 typ host"]}}
//! ```

use crate::error::{Result, SignalingError};
use serde::{Deserialize, Serialize};

/// Transport protocols a peer can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Udp,
    Tcp,
}

/// Transport hints attached to offers and answers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportHints {
    /// Preferred address of the sender.
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub protocols: Vec<Protocol>,
    /// Codec names in the sender's order of preference.
    #[serde(default)]
    pub codecs: Vec<String>,
    /// Candidate lines (`<foundation> <component> <transport> <priority> <ip> <port> typ <type>`).
    #[serde(default)]
    pub candidates: Vec<String>,
    /// Channel number to use when talking through the sender's relay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_channel: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_mode: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decode_mode: Option<i32>,
}

/// A negotiation message for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalingMessage {
    Offer {
        session_id: String,
        from: String,
        hints: TransportHints,
    },
    Answer {
        session_id: String,
        from: String,
        hints: TransportHints,
    },
    Candidate {
        session_id: String,
        from: String,
        candidate: String,
    },
    Bye {
        session_id: String,
        from: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl SignalingMessage {
    pub fn session_id(&self) -> &str {
        match self {
            SignalingMessage::Offer { session_id, .. }
            | SignalingMessage::Answer { session_id, .. }
            | SignalingMessage::Candidate { session_id, .. }
            | SignalingMessage::Bye { session_id, .. } => session_id,
        }
    }

    /// Identity of the peer that sent the message.
    pub fn sender(&self) -> &str {
        match self {
            SignalingMessage::Offer { from, .. }
            | SignalingMessage::Answer { from, .. }
            | SignalingMessage::Candidate { from, .. }
            | SignalingMessage::Bye { from, .. } => from,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SignalingMessage::Offer { .. } => "offer",
            SignalingMessage::Answer { .. } => "answer",
            SignalingMessage::Candidate { .. } => "candidate",
            SignalingMessage::Bye { .. } => "bye",
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| SignalingError::InvalidMessage(e.to_string()))
    }

    pub fn from_json(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| SignalingError::InvalidMessage(e.to_string()))
    }
}
