//! Video types, H.264 bitstream helpers and decoders

pub mod codecs;
pub mod constants;
pub mod frame;
pub mod nal;
pub mod sps;
pub mod traits;
