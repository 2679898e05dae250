//! Datagram wire format
//!
//! Every datagram starts with a 10-byte header:
//!
//! ```text
//!  0       1       2               6               10
//! +-------+-------+---------------+---------------+----------
//! |ver|flg| kind  |   sequence    |   timestamp   | payload...
//! +-------+-------+---------------+---------------+----------
//! ```
//!
//! The first byte carries the version in its top two bits and the media
//! flags (marker, keyframe, retransmission) in the low bits. Integers are
//! big-endian. Keepalives reuse the sequence field as the ping id; a NACK
//! payload is a list of big-endian u32 sequence numbers.

use crate::error::{Result, TransportError};

pub const HEADER_SIZE: usize = 10;
pub const VERSION: u8 = 1;

const VERSION_SHIFT: u8 = 6;
const FLAG_MARKER: u8 = 0x01;
const FLAG_KEYFRAME: u8 = 0x02;
const FLAG_RETRANSMIT: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketKind {
    Media = 0,
    Keepalive = 1,
    KeepaliveAck = 2,
    Nack = 3,
    Bye = 4,
}

impl PacketKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PacketKind::Media),
            1 => Some(PacketKind::Keepalive),
            2 => Some(PacketKind::KeepaliveAck),
            3 => Some(PacketKind::Nack),
            4 => Some(PacketKind::Bye),
            _ => None,
        }
    }
}

/// One unit of encoded media.
///
/// `generation` is not on the wire: the receiving channel stamps it so
/// that sequence numbers are never compared across reconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePacket {
    pub generation: u32,
    pub sequence: u32,
    /// 90 kHz media timestamp.
    pub timestamp: u32,
    /// Last packet of an access unit.
    pub marker: bool,
    pub keyframe: bool,
    pub payload: Vec<u8>,
}

impl FramePacket {
    pub fn new(sequence: u32, timestamp: u32, payload: Vec<u8>) -> Self {
        Self {
            generation: 0,
            sequence,
            timestamp,
            marker: false,
            keyframe: false,
            payload,
        }
    }

    pub fn with_marker(mut self, marker: bool) -> Self {
        self.marker = marker;
        self
    }

    pub fn with_keyframe(mut self, keyframe: bool) -> Self {
        self.keyframe = keyframe;
        self
    }

    pub fn with_generation(mut self, generation: u32) -> Self {
        self.generation = generation;
        self
    }
}

/// A decoded datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datagram {
    Media {
        packet: FramePacket,
        retransmit: bool,
    },
    Keepalive(u32),
    KeepaliveAck(u32),
    Nack(Vec<u32>),
    Bye,
}

impl Datagram {
    pub fn media(packet: FramePacket) -> Self {
        Datagram::Media {
            packet,
            retransmit: false,
        }
    }

    pub fn kind(&self) -> PacketKind {
        match self {
            Datagram::Media { .. } => PacketKind::Media,
            Datagram::Keepalive(_) => PacketKind::Keepalive,
            Datagram::KeepaliveAck(_) => PacketKind::KeepaliveAck,
            Datagram::Nack(_) => PacketKind::Nack,
            Datagram::Bye => PacketKind::Bye,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let (flags, sequence, timestamp, payload): (u8, u32, u32, &[u8]) = match self {
            Datagram::Media { packet, retransmit } => {
                let mut flags = 0;
                if packet.marker {
                    flags |= FLAG_MARKER;
                }
                if packet.keyframe {
                    flags |= FLAG_KEYFRAME;
                }
                if *retransmit {
                    flags |= FLAG_RETRANSMIT;
                }
                (flags, packet.sequence, packet.timestamp, packet.payload.as_slice())
            }
            Datagram::Keepalive(id) | Datagram::KeepaliveAck(id) => (0, *id, 0, &[][..]),
            Datagram::Nack(_) | Datagram::Bye => (0, 0, 0, &[][..]),
        };

        let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
        bytes.push((VERSION << VERSION_SHIFT) | flags);
        bytes.push(self.kind() as u8);
        bytes.extend_from_slice(&sequence.to_be_bytes());
        bytes.extend_from_slice(&timestamp.to_be_bytes());
        match self {
            Datagram::Nack(sequences) => {
                for sequence in sequences {
                    bytes.extend_from_slice(&sequence.to_be_bytes());
                }
            }
            _ => bytes.extend_from_slice(payload),
        }
        bytes
    }

    /// # Errors
    ///
    /// `InvalidPacket` on a short header, unknown version or kind, or a
    /// NACK payload that is not a whole number of sequence numbers.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(TransportError::InvalidPacket(format!(
                "datagram too short: {} bytes",
                bytes.len()
            )));
        }
        let version = bytes[0] >> VERSION_SHIFT;
        if version != VERSION {
            return Err(TransportError::InvalidPacket(format!(
                "unsupported version {}",
                version
            )));
        }
        let flags = bytes[0];
        let kind = PacketKind::from_u8(bytes[1]).ok_or_else(|| {
            TransportError::InvalidPacket(format!("unknown packet kind {}", bytes[1]))
        })?;
        let sequence = u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
        let timestamp = u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
        let payload = &bytes[HEADER_SIZE..];

        Ok(match kind {
            PacketKind::Media => Datagram::Media {
                packet: FramePacket {
                    generation: 0,
                    sequence,
                    timestamp,
                    marker: flags & FLAG_MARKER != 0,
                    keyframe: flags & FLAG_KEYFRAME != 0,
                    payload: payload.to_vec(),
                },
                retransmit: flags & FLAG_RETRANSMIT != 0,
            },
            PacketKind::Keepalive => Datagram::Keepalive(sequence),
            PacketKind::KeepaliveAck => Datagram::KeepaliveAck(sequence),
            PacketKind::Nack => {
                if payload.len() % 4 != 0 {
                    return Err(TransportError::InvalidPacket(format!(
                        "nack payload of {} bytes",
                        payload.len()
                    )));
                }
                Datagram::Nack(
                    payload
                        .chunks_exact(4)
                        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                        .collect(),
                )
            }
            PacketKind::Bye => Datagram::Bye,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_header_layout() {
        let packet = FramePacket::new(0x01020304, 0x0A0B0C0D, vec![0x65, 0xAA])
            .with_marker(true)
            .with_keyframe(true);
        let bytes = Datagram::media(packet).encode();

        assert_eq!(bytes.len(), HEADER_SIZE + 2);
        assert_eq!(bytes[0], 0x40 | FLAG_MARKER | FLAG_KEYFRAME);
        assert_eq!(bytes[1], PacketKind::Media as u8);
        assert_eq!(&bytes[2..6], &[1, 2, 3, 4]);
        assert_eq!(&bytes[6..10], &[0x0A, 0x0B, 0x0C, 0x0D]);
        assert_eq!(&bytes[10..], &[0x65, 0xAA]);
    }

    #[test]
    fn test_media_decode_flags() {
        let packet = FramePacket::new(7, 3000, vec![1, 2, 3]).with_marker(true);
        let datagram = Datagram::Media {
            packet: packet.clone(),
            retransmit: true,
        };
        match Datagram::decode(&datagram.encode()).unwrap() {
            Datagram::Media {
                packet: decoded,
                retransmit,
            } => {
                assert!(retransmit);
                assert!(decoded.marker);
                assert!(!decoded.keyframe);
                assert_eq!(decoded, packet);
            }
            other => panic!("unexpected datagram {:?}", other),
        }
    }

    #[test]
    fn test_nack_payload() {
        let bytes = Datagram::Nack(vec![5, 6, 900]).encode();
        assert_eq!(bytes.len(), HEADER_SIZE + 12);
        assert_eq!(Datagram::decode(&bytes).unwrap(), Datagram::Nack(vec![5, 6, 900]));
    }

    #[test]
    fn test_keepalive_carries_id() {
        let bytes = Datagram::Keepalive(77).encode();
        assert_eq!(Datagram::decode(&bytes).unwrap(), Datagram::Keepalive(77));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(Datagram::decode(&[0x40, 0, 0]).is_err());

        let mut bytes = Datagram::Bye.encode();
        bytes[0] = 0x80;
        assert!(Datagram::decode(&bytes).is_err());

        let mut bytes = Datagram::Bye.encode();
        bytes[1] = 9;
        assert!(Datagram::decode(&bytes).is_err());

        let mut bytes = Datagram::Nack(vec![1]).encode();
        bytes.pop();
        assert!(Datagram::decode(&bytes).is_err());
    }
}
