//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! The `[radio]` section is read once at startup and stays fixed for the
//! process lifetime; retuning requires a restart.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// LoRa bandwidth selection.
///
/// Carries the SX1280 register code for each supported bandwidth.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Bandwidth {
    #[serde(rename = "200khz")]
    Khz200,
    #[serde(rename = "400khz")]
    Khz400,
    #[serde(rename = "800khz")]
    Khz800,
    #[serde(rename = "1600khz")]
    Khz1600,
}

impl Bandwidth {
    /// SX1280 modulation-parameter register code.
    pub fn register_value(self) -> u8 {
        match self {
            Bandwidth::Khz200 => 0x34,
            Bandwidth::Khz400 => 0x26,
            Bandwidth::Khz800 => 0x18,
            Bandwidth::Khz1600 => 0x0A,
        }
    }
}

/// LoRa coding rate selection, including the long-interleaved variants
/// used by ELRS air modes.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum CodingRate {
    #[serde(rename = "4/5")]
    Cr4_5,
    #[serde(rename = "4/6")]
    Cr4_6,
    #[serde(rename = "4/7")]
    Cr4_7,
    #[serde(rename = "4/8")]
    Cr4_8,
    #[serde(rename = "li-4/5")]
    CrLi4_5,
    #[serde(rename = "li-4/6")]
    CrLi4_6,
    #[serde(rename = "li-4/7")]
    CrLi4_7,
    #[serde(rename = "li-4/8")]
    CrLi4_8,
}

impl CodingRate {
    /// SX1280 modulation-parameter register code.
    pub fn register_value(self) -> u8 {
        match self {
            CodingRate::Cr4_5 => 0x01,
            CodingRate::Cr4_6 => 0x02,
            CodingRate::Cr4_7 => 0x03,
            CodingRate::Cr4_8 => 0x04,
            CodingRate::CrLi4_5 => 0x05,
            CodingRate::CrLi4_6 => 0x06,
            CodingRate::CrLi4_7 => 0x07,
            CodingRate::CrLi4_8 => 0x08,
        }
    }
}

/// Capture record output format.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    #[serde(rename = "log")]
    Log,
    #[serde(rename = "jsonl")]
    Jsonl,
}

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub radio: RadioConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub sniffer: SnifferConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Radio tuning configuration, fixed at initialization.
///
/// The listening parameters must match the air mode of the link under
/// observation; there is no hop-sequence tracking, so the sniffer sits on
/// one fixed frequency.
#[derive(Debug, Deserialize, Clone)]
pub struct RadioConfig {
    #[serde(default = "default_frequency_hz")]
    pub frequency_hz: u32,

    #[serde(default = "default_spreading_factor")]
    pub spreading_factor: u8,

    #[serde(default = "default_bandwidth")]
    pub bandwidth: Bandwidth,

    #[serde(default = "default_coding_rate")]
    pub coding_rate: CodingRate,

    #[serde(default = "default_preamble_length")]
    pub preamble_length: u16,
}

/// Capture buffer configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

/// Capture loop timing configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SnifferConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_status_interval_s")]
    pub status_interval_s: u64,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// SPI bus and control pin configuration (BCM pin numbering).
///
/// Only consulted by the `rpi` bus implementation; host-side tests inject
/// their own bus and never read this section.
#[derive(Debug, Deserialize, Clone)]
pub struct BusConfig {
    #[serde(default = "default_spi_clock_hz")]
    pub spi_clock_hz: u32,

    #[serde(default = "default_nss_pin")]
    pub nss_pin: u8,

    #[serde(default = "default_reset_pin")]
    pub reset_pin: u8,

    #[serde(default = "default_busy_pin")]
    pub busy_pin: u8,

    #[serde(default = "default_dio1_pin")]
    pub dio1_pin: u8,
}

/// Capture record output configuration
#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_format")]
    pub format: OutputFormat,

    /// Output file for `jsonl` format; stdout when unset.
    #[serde(default)]
    pub path: Option<String>,
}

// Default value functions
fn default_frequency_hz() -> u32 { 2_440_000_000 }
fn default_spreading_factor() -> u8 { 6 }
fn default_bandwidth() -> Bandwidth { Bandwidth::Khz800 }
fn default_coding_rate() -> CodingRate { CodingRate::CrLi4_6 }
fn default_preamble_length() -> u16 { 12 }

fn default_buffer_capacity() -> usize { 256 }

fn default_poll_interval_ms() -> u64 { 10 }
fn default_status_interval_s() -> u64 { 10 }
fn default_busy_timeout_ms() -> u64 { 1000 }

fn default_spi_clock_hz() -> u32 { 10_000_000 }
fn default_nss_pin() -> u8 { 8 }
fn default_reset_pin() -> u8 { 24 }
fn default_busy_pin() -> u8 { 25 }
fn default_dio1_pin() -> u8 { 23 }

fn default_output_format() -> OutputFormat { OutputFormat::Log }

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            frequency_hz: default_frequency_hz(),
            spreading_factor: default_spreading_factor(),
            bandwidth: default_bandwidth(),
            coding_rate: default_coding_rate(),
            preamble_length: default_preamble_length(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

impl Default for SnifferConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            status_interval_s: default_status_interval_s(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            spi_clock_hz: default_spi_clock_hz(),
            nss_pin: default_nss_pin(),
            reset_pin: default_reset_pin(),
            busy_pin: default_busy_pin(),
            dio1_pin: default_dio1_pin(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_output_format(),
            path: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            radio: RadioConfig::default(),
            capture: CaptureConfig::default(),
            sniffer: SnifferConfig::default(),
            bus: BusConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, TOML parsing fails, or
    /// validation fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path` if given, otherwise fall back to
    /// built-in defaults.
    pub fn load_or_default(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let config = Config::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // The SX1280 tunes 2.4 GHz ISM only
        if self.radio.frequency_hz < 2_400_000_000 || self.radio.frequency_hz > 2_500_000_000 {
            return Err(crate::error::SnifferError::Config(
                toml::de::Error::custom("frequency_hz must be between 2400000000 and 2500000000"),
            ));
        }

        if self.radio.spreading_factor < 5 || self.radio.spreading_factor > 12 {
            return Err(crate::error::SnifferError::Config(
                toml::de::Error::custom("spreading_factor must be between 5 and 12"),
            ));
        }

        if self.radio.preamble_length == 0 {
            return Err(crate::error::SnifferError::Config(
                toml::de::Error::custom("preamble_length must be greater than 0"),
            ));
        }

        if self.capture.buffer_capacity == 0 || self.capture.buffer_capacity > 65536 {
            return Err(crate::error::SnifferError::Config(
                toml::de::Error::custom("buffer_capacity must be between 1 and 65536"),
            ));
        }

        if self.sniffer.poll_interval_ms == 0 || self.sniffer.poll_interval_ms > 1000 {
            return Err(crate::error::SnifferError::Config(
                toml::de::Error::custom("poll_interval_ms must be between 1 and 1000"),
            ));
        }

        if self.sniffer.status_interval_s == 0 || self.sniffer.status_interval_s > 3600 {
            return Err(crate::error::SnifferError::Config(
                toml::de::Error::custom("status_interval_s must be between 1 and 3600"),
            ));
        }

        if self.sniffer.busy_timeout_ms == 0 || self.sniffer.busy_timeout_ms > 10000 {
            return Err(crate::error::SnifferError::Config(
                toml::de::Error::custom("busy_timeout_ms must be between 1 and 10000"),
            ));
        }

        // SX1280 SPI tops out at 18 MHz
        if self.bus.spi_clock_hz < 100_000 || self.bus.spi_clock_hz > 18_000_000 {
            return Err(crate::error::SnifferError::Config(
                toml::de::Error::custom("spi_clock_hz must be between 100000 and 18000000"),
            ));
        }

        if let Some(path) = &self.output.path {
            if path.is_empty() {
                return Err(crate::error::SnifferError::Config(
                    toml::de::Error::custom("output path cannot be empty when set"),
                ));
            }
        }

        Ok(())
    }
}
