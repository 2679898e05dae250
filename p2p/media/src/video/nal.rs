//! H.264 Annex-B bitstream helpers

use super::constants::h264::*;
use crate::error::{MediaError, Result};

/// Splits an Annex-B stream into NAL units, without start codes.
///
/// Input without any start code is treated as a single NAL unit.
pub fn split_annex_b(data: &[u8]) -> Vec<&[u8]> {
    let mut units = Vec::new();
    let mut start: Option<usize> = None;
    let mut i = 0;

    while i + 3 <= data.len() {
        if data[i..i + 3] == NAL_START_CODE_3 {
            if let Some(s) = start {
                units.push(trim_trailing_zero(&data[s..i]));
            }
            i += 3;
            start = Some(i);
        } else {
            i += 1;
        }
    }

    match start {
        Some(s) if s < data.len() => units.push(&data[s..]),
        Some(_) => {}
        None if !data.is_empty() => units.push(data),
        None => {}
    }
    units.retain(|unit| !unit.is_empty());
    units
}

/// The zero byte of a 4-byte start code belongs to the next unit.
fn trim_trailing_zero(unit: &[u8]) -> &[u8] {
    match unit.last() {
        Some(0) => &unit[..unit.len() - 1],
        _ => unit,
    }
}

pub fn nal_type(unit: &[u8]) -> u8 {
    unit.first().map(|header| header & NAL_TYPE_MASK).unwrap_or(0)
}

/// Checks if NAL unit is a parameter set (SPS or PPS)
pub fn is_parameter_set(nal_type: u8) -> bool {
    nal_type == NAL_TYPE_SPS || nal_type == NAL_TYPE_PPS
}

pub fn is_slice(nal_type: u8) -> bool {
    (NAL_TYPE_NON_IDR..=NAL_TYPE_IDR).contains(&nal_type)
}

/// Whether the stream contains an IDR slice.
pub fn contains_keyframe(data: &[u8]) -> bool {
    split_annex_b(data)
        .iter()
        .any(|unit| nal_type(unit) == NAL_TYPE_IDR)
}

/// Checks that every NAL unit has a sane header.
///
/// # Errors
/// `CorruptUnit` when the stream is empty, a forbidden bit is set, a
/// reserved type (0) appears or a slice carries no payload.
pub fn validate(data: &[u8]) -> Result<()> {
    let units = split_annex_b(data);
    if units.is_empty() {
        return Err(MediaError::CorruptUnit("no NAL units".to_string()));
    }
    for unit in units {
        let header = unit[0];
        if header & FORBIDDEN_ZERO_BIT != 0 {
            return Err(MediaError::CorruptUnit(
                "forbidden_zero_bit set".to_string(),
            ));
        }
        let kind = header & NAL_TYPE_MASK;
        if kind == 0 {
            return Err(MediaError::CorruptUnit("reserved NAL type 0".to_string()));
        }
        if is_slice(kind) && unit.len() < 2 {
            return Err(MediaError::CorruptUnit(format!(
                "empty slice of type {}",
                kind
            )));
        }
    }
    Ok(())
}

/// Prepends a 4-byte start code to every unit.
pub fn join_annex_b<'a>(units: impl IntoIterator<Item = &'a [u8]>) -> Vec<u8> {
    let mut out = Vec::new();
    for unit in units {
        out.extend_from_slice(&NAL_START_CODE_4);
        out.extend_from_slice(unit);
    }
    out
}
