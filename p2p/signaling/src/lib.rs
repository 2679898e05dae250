//! Signaling Module - MQTT session with the broker
//!
//! Keeps one MQTT 3.1.1 connection per phone identity, subscribes to the
//! phone's inbox topic and exchanges offer/answer/candidate/bye messages with
//! remote devices. Lost connections are re-established with exponential
//! backoff and every subscription is restored.

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
mod io_thread;
pub mod message;
pub mod mqtt;
pub mod topics;

pub use backoff::{Backoff, ReconnectPolicy};
pub use client::{
    ConnectionStatus, Inbound, LoopbackBroker, MessageStream, OutboundRequest, SignalingClient,
    SignalingSender,
};
pub use config::SignalingConfig;
pub use error::{Result, SignalingError};
pub use message::{Protocol, SignalingMessage, TransportHints};
pub use topics::{DEFAULT_TOPIC_PREFIX, inbox_topic};
