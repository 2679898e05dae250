//! Reassembles [`EncodedUnit`]s from in-order [`FramePacket`]s.
//!
//! Packets must already be in sequence order (see `ReorderBuffer`). A unit
//! ends on the marker flag, or when a packet with a new timestamp shows the
//! marker was lost. Units with missing packets or fragments are still
//! emitted, flagged `damaged`, so the pipeline can resync. So are units
//! that outgrow the size cap; their excess payload is discarded.

use super::parse_fu_header;
use crate::codec::frame_packet::FramePacket;
use media::EncodedUnit;
use media::video::constants::h264::{
    NAL_START_CODE_4, NAL_TYPE_FU_A, NAL_TYPE_IDR, NAL_TYPE_MASK,
};

/// Largest access unit kept, well above a 4K intra frame.
pub const MAX_UNIT_SIZE: usize = 8 * 1024 * 1024;

struct Assembly {
    unit: EncodedUnit,
    /// A FU-A fragment run is open.
    in_fragment: bool,
    overflowed: bool,
}

pub struct H264Depacketizer {
    current: Option<Assembly>,
    last_sequence: Option<u32>,
    generation: Option<u32>,
    units_emitted: u64,
    max_unit_size: usize,
}

impl Default for H264Depacketizer {
    fn default() -> Self {
        Self {
            current: None,
            last_sequence: None,
            generation: None,
            units_emitted: 0,
            max_unit_size: MAX_UNIT_SIZE,
        }
    }
}

impl H264Depacketizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_unit_size(mut self, max_unit_size: usize) -> Self {
        self.max_unit_size = max_unit_size.max(1);
        self
    }

    pub fn units_emitted(&self) -> u64 {
        self.units_emitted
    }

    pub fn has_pending_data(&self) -> bool {
        self.current.is_some()
    }

    /// Feeds one packet and returns the units it completed.
    pub fn push(&mut self, packet: &FramePacket) -> Vec<EncodedUnit> {
        let mut completed = Vec::new();

        if self.generation != Some(packet.generation) {
            if let Some(unit) = self.take_current(true) {
                completed.push(unit);
            }
            self.generation = Some(packet.generation);
            self.last_sequence = None;
        }

        let gap = self
            .last_sequence
            .is_some_and(|last| packet.sequence != last.wrapping_add(1));
        self.last_sequence = Some(packet.sequence);

        if self
            .current
            .as_ref()
            .is_some_and(|a| a.unit.timestamp != packet.timestamp)
            && let Some(unit) = self.take_current(true)
        {
            completed.push(unit);
        }

        let assembly = self.current.get_or_insert_with(|| Assembly {
            unit: EncodedUnit {
                data: Vec::new(),
                timestamp: packet.timestamp,
                keyframe: false,
                first_sequence: packet.sequence,
                last_sequence: packet.sequence,
                damaged: false,
            },
            in_fragment: false,
            overflowed: false,
        });
        if gap {
            assembly.unit.damaged = true;
        }
        assembly.unit.last_sequence = packet.sequence;
        assembly.unit.keyframe |= packet.keyframe;
        if assembly.overflowed
            || assembly.unit.data.len() + packet.payload.len() + NAL_START_CODE_4.len()
                > self.max_unit_size
        {
            assembly.overflowed = true;
            assembly.unit.damaged = true;
        } else {
            append_payload(assembly, &packet.payload);
        }

        if packet.marker
            && let Some(unit) = self.take_current(false)
        {
            completed.push(unit);
        }
        completed
    }

    /// Emits whatever is buffered, flagged damaged.
    pub fn flush(&mut self) -> Option<EncodedUnit> {
        self.take_current(true)
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.last_sequence = None;
        self.generation = None;
    }

    fn take_current(&mut self, truncated: bool) -> Option<EncodedUnit> {
        let assembly = self.current.take()?;
        let mut unit = assembly.unit;
        if truncated || assembly.in_fragment {
            unit.damaged = true;
        }
        self.units_emitted += 1;
        Some(unit)
    }
}

fn append_payload(assembly: &mut Assembly, payload: &[u8]) {
    let Some(&first) = payload.first() else {
        return;
    };

    if first & NAL_TYPE_MASK != NAL_TYPE_FU_A {
        if assembly.in_fragment {
            assembly.unit.damaged = true;
            assembly.in_fragment = false;
        }
        push_nal_header(&mut assembly.unit, first);
        assembly.unit.data.extend_from_slice(&payload[1..]);
        return;
    }

    if payload.len() < 2 {
        assembly.unit.damaged = true;
        return;
    }
    let (is_start, is_end, nal_type) = parse_fu_header(payload[1]);
    if is_start {
        if assembly.in_fragment {
            assembly.unit.damaged = true;
        }
        let nri = (first >> 5) & 0x03;
        push_nal_header(&mut assembly.unit, (nri << 5) | nal_type);
        assembly.in_fragment = true;
    } else if !assembly.in_fragment {
        // The start fragment was lost; the rest of this NAL is useless.
        assembly.unit.damaged = true;
        return;
    }
    assembly.unit.data.extend_from_slice(&payload[2..]);
    if is_end {
        assembly.in_fragment = false;
    }
}

fn push_nal_header(unit: &mut EncodedUnit, header: u8) {
    unit.data.extend_from_slice(&NAL_START_CODE_4);
    unit.data.push(header);
    if header & NAL_TYPE_MASK == NAL_TYPE_IDR {
        unit.keyframe = true;
    }
}
