//! Sequence parameter set parsing (H.264 Section 7.3.2.1.1)
//!
//! Only far enough to recover the coded picture size.

/// Picture size announced by an SPS, after cropping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpsInfo {
    pub profile_idc: u8,
    pub level_idc: u8,
    pub width: u32,
    pub height: u32,
}

/// Parses an SPS NAL unit (header byte included, no start code).
pub fn parse_sps(nal: &[u8]) -> Option<SpsInfo> {
    if nal.len() < 4 {
        return None;
    }
    let rbsp = strip_emulation_prevention(&nal[1..]);
    let mut reader = BitReader::new(&rbsp);

    let profile_idc = reader.read_bits(8)? as u8;
    reader.read_bits(8)?; // constraint flags
    let level_idc = reader.read_bits(8)? as u8;
    reader.read_ue()?; // seq_parameter_set_id

    let mut chroma_format_idc = 1;
    if matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
    ) {
        chroma_format_idc = reader.read_ue()?;
        if chroma_format_idc == 3 {
            reader.read_bit()?; // separate_colour_plane_flag
        }
        reader.read_ue()?; // bit_depth_luma_minus8
        reader.read_ue()?; // bit_depth_chroma_minus8
        reader.read_bit()?; // qpprime_y_zero_transform_bypass_flag
        if reader.read_bit()? == 1 {
            let lists = if chroma_format_idc == 3 { 12 } else { 8 };
            for i in 0..lists {
                if reader.read_bit()? == 1 {
                    skip_scaling_list(&mut reader, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    reader.read_ue()?; // log2_max_frame_num_minus4
    match reader.read_ue()? {
        0 => {
            reader.read_ue()?; // log2_max_pic_order_cnt_lsb_minus4
        }
        1 => {
            reader.read_bit()?;
            reader.read_se()?;
            reader.read_se()?;
            let cycle = reader.read_ue()?;
            for _ in 0..cycle {
                reader.read_se()?;
            }
        }
        _ => {}
    }
    reader.read_ue()?; // max_num_ref_frames
    reader.read_bit()?; // gaps_in_frame_num_value_allowed_flag

    let width_in_mbs = reader.read_ue()? + 1;
    let height_in_map_units = reader.read_ue()? + 1;
    let frame_mbs_only = reader.read_bit()?;
    if frame_mbs_only == 0 {
        reader.read_bit()?; // mb_adaptive_frame_field_flag
    }
    reader.read_bit()?; // direct_8x8_inference_flag

    let mut width = width_in_mbs * 16;
    let mut height = (2 - frame_mbs_only) * height_in_map_units * 16;

    if reader.read_bit()? == 1 {
        let (left, right, top, bottom) = (
            reader.read_ue()?,
            reader.read_ue()?,
            reader.read_ue()?,
            reader.read_ue()?,
        );
        let (crop_x, crop_y) = match chroma_format_idc {
            0 | 3 => (1, 2 - frame_mbs_only),
            2 => (2, 2 - frame_mbs_only),
            _ => (2, 2 * (2 - frame_mbs_only)),
        };
        width = width.checked_sub(crop_x * (left + right))?;
        height = height.checked_sub(crop_y * (top + bottom))?;
    }

    Some(SpsInfo {
        profile_idc,
        level_idc,
        width,
        height,
    })
}

fn skip_scaling_list(reader: &mut BitReader<'_>, size: usize) -> Option<()> {
    let mut last_scale: i64 = 8;
    let mut next_scale: i64 = 8;
    for _ in 0..size {
        if next_scale != 0 {
            let delta = reader.read_se()? as i64;
            next_scale = (last_scale + delta + 256) % 256;
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Some(())
}

/// Removes `0x03` from every `00 00 03` sequence.
fn strip_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0;
    for &byte in data {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        out.push(byte);
    }
    out
}

struct BitReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    fn read_bit(&mut self) -> Option<u32> {
        let byte = *self.data.get(self.position / 8)?;
        let bit = (byte >> (7 - (self.position % 8))) & 1;
        self.position += 1;
        Some(bit as u32)
    }

    fn read_bits(&mut self, count: u32) -> Option<u32> {
        let mut value = 0;
        for _ in 0..count {
            value = (value << 1) | self.read_bit()?;
        }
        Some(value)
    }

    /// Unsigned Exp-Golomb.
    fn read_ue(&mut self) -> Option<u32> {
        let mut leading_zeros = 0;
        while self.read_bit()? == 0 {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return None;
            }
        }
        let suffix = self.read_bits(leading_zeros)?;
        Some((1u32 << leading_zeros) - 1 + suffix)
    }

    /// Signed Exp-Golomb.
    fn read_se(&mut self) -> Option<i32> {
        let code = self.read_ue()? as i64;
        let value = if code % 2 == 1 { (code + 1) / 2 } else { -(code / 2) };
        Some(value as i32)
    }
}
