//! Codec capability matching

use super::{NegotiationError, Result};
use std::fmt;

/// Video codecs, in fixed preference order (lower ordinal wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Codec {
    H264,
    H265,
    Mjpeg,
}

impl Codec {
    /// Parses a codec name as peers advertise it; unknown names give `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "h264" | "h.264" | "avc" => Some(Codec::H264),
            "h265" | "h.265" | "hevc" => Some(Codec::H265),
            "mjpeg" | "mjpg" => Some(Codec::Mjpeg),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::H264 => "H264",
            Codec::H265 => "H265",
            Codec::Mjpeg => "MJPEG",
        }
    }

    /// Parses a list of names, dropping unknown ones and keeping order.
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> Vec<Codec> {
        names.iter().filter_map(|n| Codec::parse(n.as_ref())).collect()
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Picks the session codec.
///
/// A shared first choice wins outright. Otherwise the common codec with
/// the lowest ordinal is used.
///
/// # Errors
///
/// `NoCommonCapability` when the lists do not intersect.
pub fn select_codec(local: &[Codec], remote: &[Codec]) -> Result<Codec> {
    if let (Some(l), Some(r)) = (local.first(), remote.first())
        && l == r
    {
        return Ok(*l);
    }

    local
        .iter()
        .filter(|codec| remote.contains(codec))
        .min()
        .copied()
        .ok_or_else(|| {
            NegotiationError::NoCommonCapability(format!(
                "local {} vs remote {}",
                describe(local),
                describe(remote)
            ))
        })
}

fn describe(codecs: &[Codec]) -> String {
    if codecs.is_empty() {
        return "[]".to_string();
    }
    let names: Vec<&str> = codecs.iter().map(Codec::as_str).collect();
    format!("[{}]", names.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!(Codec::parse("h264"), Some(Codec::H264));
        assert_eq!(Codec::parse("HEVC"), Some(Codec::H265));
        assert_eq!(Codec::parse(" mjpeg "), Some(Codec::Mjpeg));
        assert_eq!(Codec::parse("vp8"), None);
        assert_eq!(Codec::parse_list(&["vp8", "H265", "h264"]), vec![Codec::H265, Codec::H264]);
    }

    #[test]
    fn test_shared_first_choice_wins() {
        let codec = select_codec(&[Codec::H265, Codec::H264], &[Codec::H265, Codec::H264]).unwrap();
        assert_eq!(codec, Codec::H265);
    }

    #[test]
    fn test_different_first_choices_use_lowest_ordinal() {
        let codec = select_codec(&[Codec::Mjpeg, Codec::H265], &[Codec::H265, Codec::Mjpeg]).unwrap();
        assert_eq!(codec, Codec::H265);

        let codec = select_codec(&[Codec::H265, Codec::H264], &[Codec::H264, Codec::H265]).unwrap();
        assert_eq!(codec, Codec::H264);
    }

    #[test]
    fn test_no_common_codec() {
        let err = select_codec(&[Codec::H264], &[Codec::Mjpeg]).unwrap_err();
        assert!(matches!(err, NegotiationError::NoCommonCapability(_)));
        assert!(select_codec(&[Codec::H264], &[]).is_err());
    }
}
