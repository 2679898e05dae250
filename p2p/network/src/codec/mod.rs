//! Packet codec: wire format, reordering and H.264 (de)packetization

pub mod frame_packet;
pub mod h264;
pub mod reorder;

pub use frame_packet::{Datagram, FramePacket, HEADER_SIZE, PacketKind};
pub use h264::{H264Depacketizer, H264Packetizer};
pub use reorder::{ReorderBuffer, ReorderStats};
