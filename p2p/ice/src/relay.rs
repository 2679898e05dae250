//! TURN ChannelData framing (RFC 5766 Section 11.4)
//!
//! Datagrams sent through a relay are prefixed with the bound channel
//! number and the payload length:
//!
//! ```text
//!  0                   1                   2                   3
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |         Channel Number        |            Length             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! /                       Application Data                        /
//! ```
//!
//! No padding is added; it is optional over UDP.

use crate::errors::{IceError, Result};

pub const MIN_CHANNEL: u16 = 0x4000;
pub const MAX_CHANNEL: u16 = 0x7FFF;
pub const HEADER_SIZE: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelData<'a> {
    pub channel: u16,
    pub data: &'a [u8],
}

impl<'a> ChannelData<'a> {
    pub fn is_valid_channel(channel: u16) -> bool {
        (MIN_CHANNEL..=MAX_CHANNEL).contains(&channel)
    }

    /// Wraps `data` for `channel`.
    pub fn wrap(channel: u16, data: &[u8]) -> Result<Vec<u8>> {
        if !Self::is_valid_channel(channel) {
            return Err(IceError::InvalidCandidate(format!(
                "relay channel {:#06x} outside 0x4000-0x7FFF",
                channel
            )));
        }
        let length = u16::try_from(data.len())
            .map_err(|_| IceError::Socket("datagram too large for ChannelData".to_string()))?;
        let mut bytes = Vec::with_capacity(HEADER_SIZE + data.len());
        bytes.extend_from_slice(&channel.to_be_bytes());
        bytes.extend_from_slice(&length.to_be_bytes());
        bytes.extend_from_slice(data);
        Ok(bytes)
    }

    /// Splits a ChannelData datagram. Trailing padding is ignored.
    pub fn parse(bytes: &'a [u8]) -> Option<Self> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }
        let channel = u16::from_be_bytes([bytes[0], bytes[1]]);
        if !Self::is_valid_channel(channel) {
            return None;
        }
        let length = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
        let data = bytes.get(HEADER_SIZE..HEADER_SIZE + length)?;
        Some(Self { channel, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_layout() {
        let bytes = ChannelData::wrap(0x4001, b"abc").unwrap();
        assert_eq!(bytes, vec![0x40, 0x01, 0x00, 0x03, b'a', b'b', b'c']);
        let parsed = ChannelData::parse(&bytes).unwrap();
        assert_eq!(parsed.channel, 0x4001);
        assert_eq!(parsed.data, b"abc");
    }

    #[test]
    fn test_padding_is_ignored() {
        let parsed = ChannelData::parse(&[0x40, 0x00, 0x00, 0x01, 0xAA, 0, 0, 0]).unwrap();
        assert_eq!(parsed.data, &[0xAA]);
    }

    #[test]
    fn test_rejects_bad_channels_and_truncation() {
        assert!(ChannelData::wrap(0x3FFF, b"x").is_err());
        assert!(ChannelData::parse(&[0x80, 0x00, 0x00, 0x00]).is_none());
        assert!(ChannelData::parse(&[0x40, 0x00, 0x00, 0x05, 1, 2]).is_none());
        assert!(ChannelData::parse(&[0x40]).is_none());
    }
}
