//! Video constants

/// H.264 bitstream constants
pub mod h264 {
    pub const NAL_START_CODE_4: [u8; 4] = [0x00, 0x00, 0x00, 0x01];
    pub const NAL_START_CODE_3: [u8; 3] = [0x00, 0x00, 0x01];
    pub const NAL_TYPE_MASK: u8 = 0x1F;
    pub const FORBIDDEN_ZERO_BIT: u8 = 0x80;
    pub const NAL_TYPE_NON_IDR: u8 = 1;
    pub const NAL_TYPE_IDR: u8 = 5;
    pub const NAL_TYPE_SEI: u8 = 6;
    pub const NAL_TYPE_SPS: u8 = 7;
    pub const NAL_TYPE_PPS: u8 = 8;
    /// FU-A fragmentation unit (RFC 6184 Section 5.8)
    pub const NAL_TYPE_FU_A: u8 = 28;
}

/// Defaults for the receive path
pub mod defaults {
    /// Used until an SPS reveals the real size.
    pub const WIDTH: u32 = 1280;
    pub const HEIGHT: u32 = 720;
    /// RTP-style video clock.
    pub const CLOCK_RATE: u32 = 90_000;
    pub const DECODER_LOG_INTERVAL: u64 = 30;
}
