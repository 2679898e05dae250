//! Decoder implementations

mod annexb;
#[cfg(feature = "ffmpeg")]
mod ffmpeg;

pub use annexb::AnnexBDecoder;
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegH264Decoder;
