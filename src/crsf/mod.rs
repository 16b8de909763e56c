//! # CRSF Protocol Module
//!
//! Frame validation and decoding for CRSF (Crossfire) frames captured
//! over the air from ExpressLRS links.
//!
//! This module handles:
//! - CRC8-DVB-S2 validation over the type + payload span
//! - RC channels frame decoding (16 channels, 11-bit resolution)
//! - Frame-type recognition for undecoded telemetry frames

pub mod crc;
pub mod decoder;
pub mod protocol;
