//! # CRSF Frame Decoder
//!
//! Validates captured frames and unpacks RC channel values.
//!
//! The radio's own CRC screening is disabled in promiscuous mode, so
//! every frame that reaches this decoder is unvetted; the CRC check here
//! is the only integrity gate. A frame that fails it (or carries a frame
//! type other than RC channels) still counts as a successful raw capture.

use thiserror::Error;

use super::crc::crc8;
use super::protocol::*;

/// Errors from a single decode attempt.
///
/// These are routine for a promiscuous capture, where noise bursts and
/// foreign traffic fail constantly, and are absorbed by the capture loop
/// rather than propagated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Frame shorter than the `[sync][length][type][crc]` minimum
    #[error("frame too short: {len} bytes")]
    FrameTooShort { len: usize },

    /// CRC over the type + payload span did not match the trailer byte
    #[error("CRC mismatch: computed 0x{computed:02X}, received 0x{received:02X}")]
    CrcMismatch { computed: u8, received: u8 },

    /// RC channels frame whose payload is not exactly 22 bytes
    #[error("channel payload length {len}, expected 22 bytes")]
    ChannelPayloadLength { len: usize },
}

/// Check a captured frame's CRC.
///
/// The CRC spans the frame-type byte and payload only; the leading sync
/// and length bytes and the trailing CRC byte are excluded. Frames under
/// 3 bytes cannot carry a CRC and are rejected outright.
pub fn validate_crc(frame: &[u8]) -> bool {
    if frame.len() < 3 {
        return false;
    }

    let computed = crc8(&frame[2..frame.len() - 1]);
    computed == frame[frame.len() - 1]
}

/// Decode a captured frame into RC channel values.
///
/// # Arguments
///
/// * `frame` - Complete captured frame (`[sync][length][type][payload][crc]`)
///
/// # Returns
///
/// * `Ok(Some(ChannelFrame))` - valid RC channels frame
/// * `Ok(None)` - CRC-valid frame of some other type; stored raw, not decoded
/// * `Err(DecodeError)` - frame too short or CRC mismatch
///
/// The sync byte is not checked: it varies across ELRS targets, and a
/// sniffer wants the frame either way.
pub fn decode_frame(frame: &[u8]) -> Result<Option<ChannelFrame>, DecodeError> {
    // Minimum frame: [sync][length][type][crc]
    if frame.len() < 4 {
        return Err(DecodeError::FrameTooShort { len: frame.len() });
    }

    let computed = crc8(&frame[2..frame.len() - 1]);
    let received = frame[frame.len() - 1];
    if computed != received {
        return Err(DecodeError::CrcMismatch { computed, received });
    }

    let frame_type = frame[2];
    if frame_type != CRSF_FRAMETYPE_RC_CHANNELS_PACKED {
        return Ok(None);
    }

    let payload = &frame[3..frame.len() - 1];
    let payload: &[u8; CRSF_RC_CHANNELS_PAYLOAD_SIZE] = payload
        .try_into()
        .map_err(|_| DecodeError::ChannelPayloadLength { len: payload.len() })?;

    Ok(Some(ChannelFrame {
        channels: unpack_channels(payload),
    }))
}

/// Unpack 16 channels of 11 bits each from a 22-byte payload.
///
/// The payload is one continuous little-endian bitstream: channel `i`
/// occupies bits `i * 11 .. i * 11 + 11`. Each value spans two bytes, or
/// three when its start offset within the first byte is above 5.
pub fn unpack_channels(
    payload: &[u8; CRSF_RC_CHANNELS_PAYLOAD_SIZE],
) -> [u16; CRSF_NUM_CHANNELS] {
    let mut channels = [0u16; CRSF_NUM_CHANNELS];

    for (ch, slot) in channels.iter_mut().enumerate() {
        let bit_index = ch * 11;
        let byte_index = bit_index / 8;
        let bit_offset = bit_index % 8;

        let mut value = (payload[byte_index] as u16) >> bit_offset;
        value |= (payload[byte_index + 1] as u16) << (8 - bit_offset);
        // Third byte contributes only for offsets above 5; at the final
        // channel the guard also stays inside the 22-byte payload.
        if bit_offset > 5 || (bit_offset == 5 && ch < CRSF_NUM_CHANNELS - 1) {
            value |= (payload[byte_index + 2] as u16) << (16 - bit_offset);
        }

        *slot = value & 0x07FF;
    }

    channels
}

/// Map an 11-bit channel value (0-2047) onto the conventional pulse-width
/// range 988-2012 us, center 1500. Display only; wire values stay 11-bit.
pub fn channel_to_microseconds(value: u16) -> u16 {
    let value = value.min(CRSF_CHANNEL_VALUE_MAX) as u32;
    (value * 1024 / 2047 + 988) as u16
}
