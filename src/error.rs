//! # Error Types
//!
//! Custom error types for the ELRS sniffer using `thiserror`.

use thiserror::Error;

use crate::crsf::decoder::DecodeError;

/// Initialization phase, reported when startup cannot proceed.
///
/// The sniffer halts on the first failing phase instead of retrying; the
/// phase tells an operator whether the radio hardware, its promiscuous
/// configuration, or the capture output failed to come up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitPhase {
    /// SPI bus setup, hardware reset, and standby entry.
    RadioBringUp,
    /// The ordered promiscuous-mode configuration sequence.
    PromiscuousConfig,
    /// Bring-up of the capture record sink.
    Publication,
}

impl std::fmt::Display for InitPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitPhase::RadioBringUp => write!(f, "radio bring-up"),
            InitPhase::PromiscuousConfig => write!(f, "promiscuous configuration"),
            InitPhase::Publication => write!(f, "publication bring-up"),
        }
    }
}

/// Main error type for the ELRS sniffer
#[derive(Debug, Error)]
pub enum SnifferError {
    /// Initialization failed; the sniffer cannot make progress.
    #[error("{phase} failed: {reason}")]
    Init { phase: InitPhase, reason: String },

    /// SPI/GPIO bus errors
    #[error("radio bus error: {0}")]
    Bus(String),

    /// Frame decode errors (routine for a promiscuous capture)
    #[error("frame decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SnifferError {
    /// Tag a startup-time failure with the initialization phase it
    /// occurred in. Errors already carrying a phase pass through.
    pub fn during(self, phase: InitPhase) -> SnifferError {
        match self {
            tagged @ SnifferError::Init { .. } => tagged,
            other => SnifferError::Init {
                phase,
                reason: other.to_string(),
            },
        }
    }
}

/// Result type alias for the ELRS sniffer
pub type Result<T> = std::result::Result<T, SnifferError>;
