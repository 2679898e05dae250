//! P2P video session engine
//!
//! Drives a peer-to-peer H.264 video session for a mobile UI:
//!
//! 1. [`bridge::P2pVideoEngine`] turns the four UI operations
//!    (`initMqtt`, `setDevP2p`, `startP2pVideo`, `stopP2pVideo`) into
//!    commands with [`CommandTicket`]s.
//! 2. The session manager worker keeps the MQTT signaling connection,
//!    negotiates a direct or relayed UDP path, opens a transport channel
//!    and feeds the decode pipeline.
//! 3. Decoded frames go to the render surface leased from the
//!    [`SurfaceRegistry`] for the requested texture id.
//!
//! [`ffi`] exposes the same operations over a C ABI.

pub mod bridge;
pub mod cancel;
pub mod config;
pub mod error;
pub mod ffi;
pub mod identity;
pub mod negotiation;
pub mod pipeline;
pub mod session;

pub use bridge::{EventStream, P2pVideoEngine};
pub use cancel::CancelToken;
pub use config::{EngineConfig, LoggingConfig, NegotiationConfig, PipelineConfig, TransportConfig};
pub use error::{EngineError, ErrorCode, FailureReport, Result};
pub use identity::{DeviceId, Identity, PhoneId};
pub use media::{RenderSurface, SurfaceRegistry};
pub use session::{CommandTicket, EngineDeps, SessionCommand, SessionEvent, SessionState};
