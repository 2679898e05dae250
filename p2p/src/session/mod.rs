//! Session manager
//!
//! One worker thread owns the signaling connection, the in-flight
//! connection attempt and the streaming session. The bridge talks to it
//! only through [`SessionCommand`]s; results come back on
//! [`CommandTicket`]s and as [`SessionEvent`]s.

pub mod deps;
mod manager;
pub mod ticket;
mod workers;

pub use deps::{
    ChannelOpener, DecoderFactory, DefaultDecoderFactory, EngineDeps, LoopbackConnector,
    MqttConnector, NegotiatorFactory, SignalingConnector, SignalingNegotiatorFactory,
    UdpChannelOpener,
};
pub(crate) use manager::{ManagerMessage, ManagerThreadParams, run_manager_thread};
pub use ticket::{CommandOutcome, CommandTicket, TicketResolver};

use crate::error::{ErrorCode, FailureReport};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    /// Peer bound, waiting for start.
    Negotiating = 1,
    Connecting = 2,
    Streaming = 3,
    Closing = 4,
    Error = 5,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Negotiating => "negotiating",
            SessionState::Connecting => "connecting",
            SessionState::Streaming => "streaming",
            SessionState::Closing => "closing",
            SessionState::Error => "error",
        }
    }

    pub(crate) fn load(cell: &AtomicU8) -> Self {
        match cell.load(Ordering::SeqCst) {
            1 => SessionState::Negotiating,
            2 => SessionState::Connecting,
            3 => SessionState::Streaming,
            4 => SessionState::Closing,
            5 => SessionState::Error,
            _ => SessionState::Idle,
        }
    }

    pub(crate) fn store(self, cell: &AtomicU8) {
        cell.store(self as u8, Ordering::SeqCst);
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations the UI can ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Init {
        phone_id: String,
    },
    SetPeer {
        device_id: String,
    },
    Start {
        device_id: String,
        display_mode: i32,
        texture_id: i64,
        decode_mode: i32,
    },
    Stop,
    Deinit,
    SendJson {
        json: String,
        /// Empty means the bound peer's inbox.
        topic: String,
    },
}

impl SessionCommand {
    pub fn name(&self) -> &'static str {
        match self {
            SessionCommand::Init { .. } => "initMqtt",
            SessionCommand::SetPeer { .. } => "setDevP2p",
            SessionCommand::Start { .. } => "startP2pVideo",
            SessionCommand::Stop => "stopP2pVideo",
            SessionCommand::Deinit => "deinitMqtt",
            SessionCommand::SendJson { .. } => "sendJsonMsg",
        }
    }

    /// Code reported when a failure has no more specific one.
    pub fn fallback_code(&self) -> ErrorCode {
        match self {
            SessionCommand::Init { .. } => ErrorCode::MqttInitError,
            SessionCommand::SetPeer { .. } => ErrorCode::P2pSetError,
            SessionCommand::Start { .. } | SessionCommand::Stop => ErrorCode::P2pVideoError,
            SessionCommand::Deinit => ErrorCode::MqttDeinitError,
            SessionCommand::SendJson { .. } => ErrorCode::SendError,
        }
    }
}

/// Notifications for the UI, serialized as JSON for the C ABI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    StateChanged {
        state: SessionState,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    Streaming {
        session_id: String,
        path: crate::negotiation::PathKind,
        endpoint: String,
        codec: String,
        texture_id: i64,
    },
    Failure {
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(flatten)]
        report: FailureReport,
    },
    ApplicationMessage {
        topic: String,
        payload: String,
    },
    TransportReconnected {
        session_id: String,
        generation: u32,
    },
}
