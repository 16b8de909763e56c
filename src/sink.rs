//! # Capture Sink Module
//!
//! Publication seam between the capture loop and whatever consumes
//! decoded captures. The loop hands every raw frame (plus channel data
//! when decoding succeeded) to a [`Sink`] and moves on; queueing and
//! backpressure are the consumer's problem, not the loop's.

use std::fs::File;
use std::io::{self, BufWriter, Write};

use tracing::{info, warn};

use crate::capture::CapturedFrame;
use crate::config::{OutputConfig, OutputFormat};
use crate::crsf::protocol::{frame_type_name, ChannelFrame};
use crate::error::{InitPhase, Result, SnifferError};

/// Consumer of capture records.
///
/// `publish` is fire-and-forget and must not block the capture loop
/// meaningfully.
pub trait Sink: Send {
    fn publish(&mut self, frame: &CapturedFrame, channels: Option<&ChannelFrame>);
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn publish(&mut self, frame: &CapturedFrame, channels: Option<&ChannelFrame>) {
        (**self).publish(frame, channels)
    }
}

/// Space-separated uppercase hex rendering of raw frame bytes.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (index, byte) in bytes.iter().enumerate() {
        if index > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{byte:02X}"));
    }
    out
}

fn frame_type_byte(frame: &CapturedFrame) -> u8 {
    frame.bytes().get(2).copied().unwrap_or(0)
}

/// Sink that narrates captures through `tracing`.
#[derive(Debug, Default)]
pub struct LogSink;

impl Sink for LogSink {
    fn publish(&mut self, frame: &CapturedFrame, channels: Option<&ChannelFrame>) {
        info!(
            "[{}] rssi {} dBm, snr {} dB, len {}, type {}, decoded: {}",
            frame.timestamp_ms,
            frame.rssi_dbm,
            frame.snr_db,
            frame.len(),
            frame_type_name(frame_type_byte(frame)),
            if channels.is_some() { "yes" } else { "no" },
        );

        if let Some(channels) = channels {
            info!(
                "  channels: [{}, {}, {}, {}]",
                channels.channels[0],
                channels.channels[1],
                channels.channels[2],
                channels.channels[3],
            );
        }
    }
}

/// Sink emitting one JSON object per capture (JSON Lines).
pub struct JsonlSink<W: Write + Send> {
    writer: W,
}

impl JsonlSink<io::Stdout> {
    /// Record stream to stdout.
    pub fn stdout() -> Self {
        Self {
            writer: io::stdout(),
        }
    }
}

impl JsonlSink<BufWriter<File>> {
    /// Record stream to a file, truncating any existing content.
    pub fn create(path: &str) -> Result<Self> {
        let file = File::create(path).map_err(|e| SnifferError::Init {
            phase: InitPhase::Publication,
            reason: format!("cannot open output file {path}: {e}"),
        })?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl<W: Write + Send> JsonlSink<W> {
    /// Wrap an arbitrary writer (used by tests).
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send> Sink for JsonlSink<W> {
    fn publish(&mut self, frame: &CapturedFrame, channels: Option<&ChannelFrame>) {
        let record = serde_json::json!({
            "timestamp_ms": frame.timestamp_ms,
            "rssi_dbm": frame.rssi_dbm,
            "snr_db": frame.snr_db,
            "length": frame.len(),
            "type": frame_type_name(frame_type_byte(frame)),
            "bytes": hex_dump(frame.bytes()),
            "channels": channels.map(|c| c.channels.to_vec()),
        });

        // A failed write costs one record, never the capture
        if let Err(e) = writeln!(self.writer, "{record}") {
            warn!("failed to write capture record: {e}");
            return;
        }
        if let Err(e) = self.writer.flush() {
            warn!("failed to flush capture record: {e}");
        }
    }
}

/// Build the configured sink.
pub fn build_sink(config: &OutputConfig) -> Result<Box<dyn Sink>> {
    match config.format {
        OutputFormat::Log => Ok(Box::new(LogSink)),
        OutputFormat::Jsonl => match &config.path {
            Some(path) => Ok(Box::new(JsonlSink::create(path)?)),
            None => Ok(Box::new(JsonlSink::stdout())),
        },
    }
}
