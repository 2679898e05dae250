//! Pass-through H.264 "decoder" for hardware decoding on the surface side.
//!
//! Validates each access unit, tracks parameter sets, and forwards the
//! Annex-B bytes untouched so the platform decoder behind the render
//! surface (MediaCodec on Android) can consume them.

use crate::error::{MediaError, Result};
use crate::video::constants::defaults::{DECODER_LOG_INTERVAL, HEIGHT, WIDTH};
use crate::video::constants::h264::{NAL_TYPE_IDR, NAL_TYPE_PPS, NAL_TYPE_SPS};
use crate::video::frame::{DecodedFrame, EncodedUnit, PixelFormat};
use crate::video::nal::{is_slice, nal_type, split_annex_b, validate};
use crate::video::sps::parse_sps;
use crate::video::traits::VideoDecoder;
use logging::Logger;

pub struct AnnexBDecoder {
    logger: Logger,
    width: u32,
    height: u32,
    has_sps: bool,
    has_pps: bool,
    /// P slices are refused until an IDR follows the parameter sets.
    has_reference: bool,
    frame_count: u64,
}

impl AnnexBDecoder {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            width: WIDTH,
            height: HEIGHT,
            has_sps: false,
            has_pps: false,
            has_reference: false,
            frame_count: 0,
        }
    }

    /// Current picture size (the default until an SPS is seen).
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frame_count
    }
}

impl VideoDecoder for AnnexBDecoder {
    fn decode(&mut self, unit: &EncodedUnit) -> Result<Option<DecodedFrame>> {
        if unit.damaged {
            return Err(MediaError::CorruptUnit(format!(
                "unit {}..{} lost fragments",
                unit.first_sequence, unit.last_sequence
            )));
        }
        validate(&unit.data)?;

        let mut has_idr = false;
        let mut has_slice = false;
        for nal in split_annex_b(&unit.data) {
            match nal_type(nal) {
                NAL_TYPE_SPS => {
                    self.has_sps = true;
                    if let Some(info) = parse_sps(nal)
                        && (info.width, info.height) != (self.width, self.height)
                    {
                        self.logger.info(&format!(
                            "Stream size {}x{} (profile {}, level {})",
                            info.width, info.height, info.profile_idc, info.level_idc
                        ));
                        self.width = info.width;
                        self.height = info.height;
                    }
                }
                NAL_TYPE_PPS => self.has_pps = true,
                NAL_TYPE_IDR => {
                    has_idr = true;
                    has_slice = true;
                }
                kind if is_slice(kind) => has_slice = true,
                _ => {}
            }
        }

        if !has_slice {
            return Ok(None);
        }
        if !(self.has_sps && self.has_pps) {
            self.logger
                .debug("Skipping slice (waiting for SPS/PPS)");
            return Ok(None);
        }
        if has_idr {
            self.has_reference = true;
        } else if !self.has_reference {
            return Err(MediaError::CorruptUnit(
                "predicted slice without a reference picture".to_string(),
            ));
        }

        self.frame_count += 1;
        if self.frame_count.is_multiple_of(DECODER_LOG_INTERVAL) {
            self.logger.debug(&format!(
                "Forwarded {} access units ({}x{})",
                self.frame_count, self.width, self.height
            ));
        }

        Ok(Some(DecodedFrame {
            width: self.width,
            height: self.height,
            format: PixelFormat::AnnexB,
            data: unit.data.clone(),
            pts: unit.timestamp,
        }))
    }

    fn reset(&mut self) {
        self.logger.info("Resetting Annex-B decoder");
        self.has_reference = false;
    }

    fn name(&self) -> &str {
        "H264/AnnexB"
    }
}
