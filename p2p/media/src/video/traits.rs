//! Video decoder trait
//!
//! Decoders run on the pipeline's decode thread, so they must be `Send`.

use super::frame::{DecodedFrame, EncodedUnit};
use crate::error::Result;

/// Turns access units into frames for a render surface.
///
/// # Responsibilities
///
/// - Reject corrupt units with `MediaError::CorruptUnit` without poisoning
///   later units
/// - Hold back output until the stream is decodable (parameter sets seen)
/// - Forget all stream state on `reset`
pub trait VideoDecoder: Send {
    /// Decodes one access unit.
    ///
    /// # Returns
    /// * `Ok(Some(frame))` - A frame is ready
    /// * `Ok(None)` - The unit was consumed but produced no picture
    /// * `Err` - The unit is corrupt or the codec failed
    fn decode(&mut self, unit: &EncodedUnit) -> Result<Option<DecodedFrame>>;

    /// Drops reference state; the next decodable unit must be a keyframe.
    fn reset(&mut self);

    /// Codec name used in logs.
    fn name(&self) -> &str;
}
