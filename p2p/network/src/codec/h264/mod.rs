//! H.264 payload format
//!
//! Single NAL units travel as-is; NAL units larger than the payload budget
//! are split into FU-A fragments (RFC 6184 section 5.8). The marker flag is
//! set on the last packet of each access unit.

mod depacketizer;
mod packetizer;

pub use depacketizer::H264Depacketizer;
pub use packetizer::H264Packetizer;

/// FU indicator (F, NRI, type 28) and FU header (S, E, R, type).
fn parse_fu_header(fu_header: u8) -> (bool, bool, u8) {
    let is_start = (fu_header & 0x80) != 0;
    let is_end = (fu_header & 0x40) != 0;
    let nal_type = fu_header & 0x1F;
    (is_start, is_end, nal_type)
}

fn build_fu_header(nal_type: u8, is_first: bool, is_last: bool) -> u8 {
    let mut fu_header = nal_type;
    if is_first {
        fu_header |= 0x80;
    }
    if is_last {
        fu_header |= 0x40;
    }
    fu_header
}
