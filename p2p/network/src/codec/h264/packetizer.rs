//! Splits Annex-B access units into [`FramePacket`]s.

use super::build_fu_header;
use crate::codec::frame_packet::FramePacket;
use media::video::constants::h264::{NAL_TYPE_FU_A, NAL_TYPE_MASK};
use media::video::nal::{contains_keyframe, split_annex_b};

/// Two bytes of every FU-A packet go to the FU indicator and header.
const FU_A_OVERHEAD: usize = 2;
const MIN_PAYLOAD_SIZE: usize = FU_A_OVERHEAD + 1;

pub struct H264Packetizer {
    max_payload_size: usize,
}

impl H264Packetizer {
    /// `max_payload_size` is the largest packet payload, excluding the
    /// datagram header.
    pub fn new(max_payload_size: usize) -> Self {
        Self {
            max_payload_size: max_payload_size.max(MIN_PAYLOAD_SIZE),
        }
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    /// Packetizes one access unit.
    ///
    /// Returned packets carry sequence 0; the sending channel numbers them.
    /// Every packet of an access unit that contains an IDR slice is flagged
    /// as keyframe.
    pub fn packetize(&self, access_unit: &[u8], timestamp: u32) -> Vec<FramePacket> {
        let keyframe = contains_keyframe(access_unit);
        let nal_units = split_annex_b(access_unit);
        let mut packets = Vec::new();

        for (i, nal_unit) in nal_units.iter().enumerate() {
            let is_last_nal = i == nal_units.len() - 1;
            if nal_unit.len() <= self.max_payload_size {
                packets.push(
                    FramePacket::new(0, timestamp, nal_unit.to_vec())
                        .with_marker(is_last_nal)
                        .with_keyframe(keyframe),
                );
            } else {
                packets.extend(self.packetize_fu_a(nal_unit, timestamp, keyframe, is_last_nal));
            }
        }
        packets
    }

    fn packetize_fu_a(
        &self,
        nal_unit: &[u8],
        timestamp: u32,
        keyframe: bool,
        is_last_nal: bool,
    ) -> Vec<FramePacket> {
        let nal_type = nal_unit[0] & NAL_TYPE_MASK;
        let nri = (nal_unit[0] >> 5) & 0x03;
        let fu_indicator = (nri << 5) | NAL_TYPE_FU_A;

        let fragments: Vec<&[u8]> = nal_unit[1..]
            .chunks(self.max_payload_size - FU_A_OVERHEAD)
            .collect();
        let count = fragments.len();

        fragments
            .into_iter()
            .enumerate()
            .map(|(i, fragment)| {
                let is_first = i == 0;
                let is_last_fragment = i == count - 1;
                let mut payload = Vec::with_capacity(fragment.len() + FU_A_OVERHEAD);
                payload.push(fu_indicator);
                payload.push(build_fu_header(nal_type, is_first, is_last_fragment));
                payload.extend_from_slice(fragment);
                FramePacket::new(0, timestamp, payload)
                    .with_marker(is_last_nal && is_last_fragment)
                    .with_keyframe(keyframe)
            })
            .collect()
    }
}
