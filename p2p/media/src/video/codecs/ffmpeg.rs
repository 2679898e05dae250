//! H.264 software decoding through FFmpeg.
//!
//! Produces tightly packed I420 frames for surfaces that upload planes
//! themselves.

use crate::error::{MediaError, Result};
use crate::video::constants::defaults::DECODER_LOG_INTERVAL;
use crate::video::frame::{DecodedFrame, EncodedUnit, PixelFormat};
use crate::video::nal::validate;
use crate::video::traits::VideoDecoder;
use ffmpeg::decoder::video::Video as FfmpegVideoDecoder;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling::{context::Context as Scaler, flag::Flags};
use ffmpeg_next as ffmpeg;
use logging::Logger;

pub struct FfmpegH264Decoder {
    decoder: FfmpegVideoDecoder,
    logger: Logger,
    frame_count: u64,
}

impl FfmpegH264Decoder {
    /// Opens the FFmpeg H.264 decoder.
    ///
    /// # Errors
    ///
    /// `Codec` if FFmpeg cannot be initialised or has no H.264 decoder.
    pub fn new(logger: Logger) -> Result<Self> {
        logger.info("Initializing FFmpeg H264 decoder");
        ffmpeg::init().map_err(|e| MediaError::Codec(format!("Error init ffmpeg: {}", e)))?;

        let codec = ffmpeg::decoder::find(ffmpeg::codec::Id::H264)
            .or_else(|| ffmpeg::decoder::find_by_name("h264"))
            .ok_or_else(|| MediaError::Codec("H264 decoder not found".to_string()))?;
        let decoder = ffmpeg::codec::context::Context::new_with_codec(codec)
            .decoder()
            .video()
            .map_err(|e| MediaError::Codec(format!("Error opening decoder: {}", e)))?;

        Ok(Self {
            decoder,
            logger,
            frame_count: 0,
        })
    }

    fn to_i420(&self, frame: &ffmpeg::frame::Video) -> Result<Vec<u8>> {
        let converted;
        let source = if frame.format() == Pixel::YUV420P {
            frame
        } else {
            let mut scaler = Scaler::get(
                frame.format(),
                frame.width(),
                frame.height(),
                Pixel::YUV420P,
                frame.width(),
                frame.height(),
                Flags::BILINEAR,
            )
            .map_err(|e| MediaError::Codec(format!("Error creating scaler: {}", e)))?;
            let mut output = ffmpeg::frame::Video::empty();
            scaler
                .run(frame, &mut output)
                .map_err(|e| MediaError::Codec(format!("Error converting to I420: {}", e)))?;
            converted = output;
            &converted
        };

        let width = source.width() as usize;
        let height = source.height() as usize;
        let mut data = Vec::with_capacity(DecodedFrame::i420_len(source.width(), source.height()));
        for (plane, (plane_width, plane_height)) in [
            (width, height),
            (width.div_ceil(2), height.div_ceil(2)),
            (width.div_ceil(2), height.div_ceil(2)),
        ]
        .into_iter()
        .enumerate()
        {
            let stride = source.stride(plane);
            let bytes = source.data(plane);
            for row in 0..plane_height {
                let start = row * stride;
                data.extend_from_slice(&bytes[start..start + plane_width]);
            }
        }
        Ok(data)
    }
}

impl VideoDecoder for FfmpegH264Decoder {
    fn decode(&mut self, unit: &EncodedUnit) -> Result<Option<DecodedFrame>> {
        if unit.damaged {
            return Err(MediaError::CorruptUnit("unit lost fragments".to_string()));
        }
        validate(&unit.data)?;

        let packet = ffmpeg::Packet::copy(&unit.data);
        self.decoder
            .send_packet(&packet)
            .map_err(|e| MediaError::CorruptUnit(format!("decoder rejected unit: {}", e)))?;

        let mut decoded = ffmpeg::frame::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }

        self.frame_count += 1;
        if self.frame_count.is_multiple_of(DECODER_LOG_INTERVAL) {
            self.logger.debug(&format!(
                "Decoded {} frames (latest: {}x{})",
                self.frame_count,
                decoded.width(),
                decoded.height()
            ));
        }

        Ok(Some(DecodedFrame {
            width: decoded.width(),
            height: decoded.height(),
            format: PixelFormat::I420,
            data: self.to_i420(&decoded)?,
            pts: unit.timestamp,
        }))
    }

    fn reset(&mut self) {
        self.logger.info("Resetting FFmpeg H264 decoder");
        self.decoder.flush();
    }

    fn name(&self) -> &str {
        "H264/FFmpeg"
    }
}
