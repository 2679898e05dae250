//! Network Module - media transport over UDP
//!
//! Frames H.264 access units into [`FramePacket`]s, carries them over a
//! direct or relayed UDP path and restores their order on the far side.
//! A [`Channel`] owns one path for one generation: it runs keepalives,
//! answers and issues NACKs, and yields received packets as a
//! [`PacketStream`].

pub mod channel;
pub mod codec;
pub mod error;
pub mod transport;

pub use channel::{Channel, ChannelConfig, ChannelStats, ChannelTarget, PacketStream};
pub use codec::{
    Datagram, FramePacket, H264Depacketizer, H264Packetizer, PacketKind, ReorderBuffer,
    ReorderStats, HEADER_SIZE,
};
pub use error::{Result, TransportError};
pub use transport::UdpTransport;
