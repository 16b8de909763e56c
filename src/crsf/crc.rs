//! # CRC8-DVB-S2 Implementation
//!
//! CRC-8-DVB-S2 checksum calculation for CRSF frames.
//!
//! **Polynomial**: 0xD5 (x^8 + x^7 + x^6 + x^4 + x^2 + 1)
//! **Initial Value**: 0x00

/// CRC-8-DVB-S2 polynomial
pub const CRC8_POLY: u8 = 0xD5;

/// Calculate the CRC8-DVB-S2 checksum of a byte slice.
///
/// CRSF computes this over the frame-type byte and the payload; the sync
/// byte, length byte, and the trailing CRC byte itself are excluded. The
/// caller selects that span.
///
/// # Examples
///
/// ```
/// use elrs_sniffer::crsf::crc::crc8;
///
/// assert_eq!(crc8(&[0x00, 0x00]), 0x00);
/// ```
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;

    for &byte in data {
        crc ^= byte;

        for _ in 0..8 {
            if (crc & 0x80) != 0 {
                crc = (crc << 1) ^ CRC8_POLY;
            } else {
                crc <<= 1;
            }
        }
    }

    crc
}
