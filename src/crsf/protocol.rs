//! # CRSF Protocol Constants and Types
//!
//! Core protocol definitions for CRSF (Crossfire) frames as seen over the
//! air. Only the RC channels frame is decoded; the other frame types are
//! recognized so captures can be labeled, nothing more.

/// CRSF frame sync byte (0xC8 on most targets; receivers are lenient)
pub const CRSF_SYNC_BYTE: u8 = 0xC8;

/// GPS telemetry frame type
pub const CRSF_FRAMETYPE_GPS: u8 = 0x02;

/// Battery sensor telemetry frame type
pub const CRSF_FRAMETYPE_BATTERY_SENSOR: u8 = 0x08;

/// Link statistics frame type
pub const CRSF_FRAMETYPE_LINK_STATISTICS: u8 = 0x14;

/// RC channels frame type, the one frame this sniffer decodes
pub const CRSF_FRAMETYPE_RC_CHANNELS_PACKED: u8 = 0x16;

/// Attitude telemetry frame type
pub const CRSF_FRAMETYPE_ATTITUDE: u8 = 0x1E;

/// Flight mode telemetry frame type
pub const CRSF_FRAMETYPE_FLIGHT_MODE: u8 = 0x21;

/// Maximum over-air CRSF frame size in bytes
pub const CRSF_MAX_PACKET_SIZE: usize = 64;

/// Number of RC channels
pub const CRSF_NUM_CHANNELS: usize = 16;

/// RC channels payload size (16 channels x 11 bits = 22 bytes)
pub const CRSF_RC_CHANNELS_PAYLOAD_SIZE: usize = 22;

/// Channel value range (11-bit)
pub const CRSF_CHANNEL_VALUE_MIN: u16 = 0;
pub const CRSF_CHANNEL_VALUE_MAX: u16 = 2047;
pub const CRSF_CHANNEL_VALUE_CENTER: u16 = 1024;

/// Decoded RC channel values from a single channel-data frame.
///
/// Recomputed per decode attempt and never stored; the raw capture in the
/// ring buffer is the durable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelFrame {
    /// 11-bit channel values (0-2047)
    pub channels: [u16; CRSF_NUM_CHANNELS],
}

/// Human-readable label for a CRSF frame type byte.
///
/// Undecoded but recognized types get their protocol name; everything else
/// is `"unknown"`.
pub fn frame_type_name(frame_type: u8) -> &'static str {
    match frame_type {
        CRSF_FRAMETYPE_GPS => "gps",
        CRSF_FRAMETYPE_BATTERY_SENSOR => "battery-sensor",
        CRSF_FRAMETYPE_LINK_STATISTICS => "link-statistics",
        CRSF_FRAMETYPE_RC_CHANNELS_PACKED => "rc-channels",
        CRSF_FRAMETYPE_ATTITUDE => "attitude",
        CRSF_FRAMETYPE_FLIGHT_MODE => "flight-mode",
        _ => "unknown",
    }
}
