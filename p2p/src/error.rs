//! Engine errors and the failure reports handed to the UI

use crate::negotiation::NegotiationError;
use crate::pipeline::PipelineError;
use media::MediaError;
use network::TransportError;
use serde::Serialize;
use signaling::SignalingError;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Stable failure codes reported across the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "&'static str")]
pub enum ErrorCode {
    MqttInitError,
    MqttDeinitError,
    P2pSetError,
    P2pVideoError,
    AuthRejected,
    SignalingUnreachable,
    NegotiationTimeout,
    NoCommonCapability,
    TransportDead,
    PipelineStalled,
    SurfaceUnavailable,
    InvalidState,
    InvalidArgument,
    Cancelled,
    PeerClosed,
    EngineBusy,
    SendError,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 17] = [
        ErrorCode::MqttInitError,
        ErrorCode::MqttDeinitError,
        ErrorCode::P2pSetError,
        ErrorCode::P2pVideoError,
        ErrorCode::AuthRejected,
        ErrorCode::SignalingUnreachable,
        ErrorCode::NegotiationTimeout,
        ErrorCode::NoCommonCapability,
        ErrorCode::TransportDead,
        ErrorCode::PipelineStalled,
        ErrorCode::SurfaceUnavailable,
        ErrorCode::InvalidState,
        ErrorCode::InvalidArgument,
        ErrorCode::Cancelled,
        ErrorCode::PeerClosed,
        ErrorCode::EngineBusy,
        ErrorCode::SendError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MqttInitError => "MQTT_INIT_ERROR",
            ErrorCode::MqttDeinitError => "MQTT_DEINIT_ERROR",
            ErrorCode::P2pSetError => "P2P_SET_ERROR",
            ErrorCode::P2pVideoError => "P2P_VIDEO_ERROR",
            ErrorCode::AuthRejected => "AUTH_REJECTED",
            ErrorCode::SignalingUnreachable => "SIGNALING_UNREACHABLE",
            ErrorCode::NegotiationTimeout => "NEGOTIATION_TIMEOUT",
            ErrorCode::NoCommonCapability => "NO_COMMON_CAPABILITY",
            ErrorCode::TransportDead => "TRANSPORT_DEAD",
            ErrorCode::PipelineStalled => "PIPELINE_STALLED",
            ErrorCode::SurfaceUnavailable => "SURFACE_UNAVAILABLE",
            ErrorCode::InvalidState => "INVALID_STATE",
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::PeerClosed => "PEER_CLOSED",
            ErrorCode::EngineBusy => "ENGINE_BUSY",
            ErrorCode::SendError => "SEND_ERROR",
        }
    }

    /// Positive integer used across the C ABI; 0 means success there.
    pub fn as_i32(&self) -> i32 {
        ErrorCode::ALL
            .iter()
            .position(|code| code == self)
            .map(|index| index as i32 + 1)
            .unwrap_or(i32::MAX)
    }
}

impl From<ErrorCode> for &'static str {
    fn from(code: ErrorCode) -> Self {
        code.as_str()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a failed command resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{code}: {message}")]
pub struct FailureReport {
    pub code: ErrorCode,
    pub message: String,
}

impl FailureReport {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Signaling(#[from] SignalingError),
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("command queue is full")]
    Busy,
    #[error("engine is shut down")]
    ShutDown,
    #[error("peer closed the session: {0}")]
    PeerClosed(String),
    #[error("cancelled by stop")]
    Cancelled,
}

impl From<config_loader::ConfigError> for EngineError {
    fn from(err: config_loader::ConfigError) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl EngineError {
    /// The refined code for this error, or `fallback` (the failing
    /// operation's bridge code) when there is no better one.
    pub fn code_for(&self, fallback: ErrorCode) -> ErrorCode {
        match self {
            EngineError::Signaling(SignalingError::AuthRejected(_)) => ErrorCode::AuthRejected,
            EngineError::Signaling(SignalingError::Unreachable(_)) => {
                ErrorCode::SignalingUnreachable
            }
            EngineError::Signaling(SignalingError::QueueFull | SignalingError::Closed) => {
                ErrorCode::SendError
            }
            EngineError::Signaling(_) => fallback,
            EngineError::Negotiation(NegotiationError::Timeout(_)) => {
                ErrorCode::NegotiationTimeout
            }
            EngineError::Negotiation(NegotiationError::NoCommonCapability(_)) => {
                ErrorCode::NoCommonCapability
            }
            EngineError::Negotiation(NegotiationError::Cancelled) => ErrorCode::Cancelled,
            EngineError::Negotiation(NegotiationError::Rejected(_)) => ErrorCode::PeerClosed,
            EngineError::Negotiation(_) => fallback,
            EngineError::Transport(TransportError::Dead { .. }) => ErrorCode::TransportDead,
            EngineError::Transport(TransportError::RemoteBye) => ErrorCode::PeerClosed,
            EngineError::Transport(_) => fallback,
            EngineError::Pipeline(PipelineError::Stalled(_)) => ErrorCode::PipelineStalled,
            EngineError::Pipeline(_) => fallback,
            EngineError::Media(
                MediaError::SurfaceNotRegistered(_)
                | MediaError::SurfaceBusy(_)
                | MediaError::Surface(_),
            ) => ErrorCode::SurfaceUnavailable,
            EngineError::Media(_) => fallback,
            EngineError::InvalidArgument(_) | EngineError::Config(_) => ErrorCode::InvalidArgument,
            EngineError::InvalidState(_) | EngineError::ShutDown => ErrorCode::InvalidState,
            EngineError::Busy => ErrorCode::EngineBusy,
            EngineError::PeerClosed(_) => ErrorCode::PeerClosed,
            EngineError::Cancelled => ErrorCode::Cancelled,
        }
    }

    pub fn report(&self, fallback: ErrorCode) -> FailureReport {
        FailureReport::new(self.code_for(fallback), self.to_string())
    }
}
