//! Media Module - video units, decoders and render surfaces
//!
//! Holds the types that flow through the receive pipeline: reassembled
//! H.264 access units ([`EncodedUnit`]), decoded images ([`DecodedFrame`]),
//! the [`VideoDecoder`] abstraction and the [`SurfaceRegistry`] that hands
//! render surfaces to one pipeline at a time.

pub mod error;
pub mod surface;
pub mod video;

pub use error::{MediaError, Result};
pub use surface::{RenderSurface, SurfaceLease, SurfaceRegistry};
pub use video::codecs::AnnexBDecoder;
#[cfg(feature = "ffmpeg")]
pub use video::codecs::FfmpegH264Decoder;
pub use video::frame::{DecodedFrame, EncodedUnit, PixelFormat};
pub use video::traits::VideoDecoder;
