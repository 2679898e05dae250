//! Encoded and decoded video units.

use super::constants::defaults::CLOCK_RATE;
use std::time::Duration;

/// One reassembled H.264 access unit in Annex-B form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedUnit {
    pub data: Vec<u8>,
    /// 90 kHz presentation timestamp.
    pub timestamp: u32,
    pub keyframe: bool,
    pub first_sequence: u32,
    pub last_sequence: u32,
    /// Set when fragments of the unit were lost in transit.
    pub damaged: bool,
}

impl EncodedUnit {
    pub fn new(data: Vec<u8>, timestamp: u32, keyframe: bool, sequence: u32) -> Self {
        Self {
            data,
            timestamp,
            keyframe,
            first_sequence: sequence,
            last_sequence: sequence,
            damaged: false,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Pixel layout of a [`DecodedFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Validated Annex-B bytes, decoded by the platform on the surface side.
    AnnexB,
    /// Planar YUV 4:2:0, Y then U then V, no padding.
    I420,
}

/// A frame ready for a render surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
    /// 90 kHz presentation timestamp.
    pub pts: u32,
}

impl DecodedFrame {
    /// Offset of this frame's timestamp from `base`, as wall time.
    pub fn offset_from(&self, base: u32) -> Duration {
        let ticks = self.pts.wrapping_sub(base) as u64;
        Duration::from_micros(ticks * 1_000_000 / CLOCK_RATE as u64)
    }

    /// Expected I420 buffer length for the given size.
    pub fn i420_len(width: u32, height: u32) -> usize {
        let luma = (width * height) as usize;
        let chroma = (width.div_ceil(2) * height.div_ceil(2)) as usize;
        luma + 2 * chroma
    }
}
