//! # Packet Capture Module
//!
//! Fixed-capacity ring storage for raw captured frames.
//!
//! The capture loop is the sole writer; eviction of the oldest frame is
//! the backpressure policy, made visible through the lifetime dropped
//! counter rather than reported as an error. A [`CaptureStats`] handle
//! mirrors the counters through relaxed atomics so a reporting consumer
//! can read them without stalling the loop.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

/// Maximum over-air frame size stored per capture, in bytes.
pub const MAX_FRAME_SIZE: usize = 64;

/// A single raw over-air capture.
///
/// Created when a receive-complete event is drained from the radio and
/// immutable afterwards; the only way one disappears is ring overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturedFrame {
    /// Milliseconds since capture start
    pub timestamp_ms: u64,
    /// Signal strength in dBm
    pub rssi_dbm: i8,
    /// Signal-to-noise ratio in dB
    pub snr_db: i8,
    length: u8,
    data: [u8; MAX_FRAME_SIZE],
}

impl CapturedFrame {
    /// Build a frame record from raw payload bytes.
    ///
    /// `bytes` longer than [`MAX_FRAME_SIZE`] are truncated; the radio
    /// read path never produces such a frame, but the record type does
    /// not rely on that.
    pub fn new(timestamp_ms: u64, rssi_dbm: i8, snr_db: i8, bytes: &[u8]) -> Self {
        let length = bytes.len().min(MAX_FRAME_SIZE);
        let mut data = [0u8; MAX_FRAME_SIZE];
        data[..length].copy_from_slice(&bytes[..length]);

        Self {
            timestamp_ms,
            rssi_dbm,
            snr_db,
            length: length as u8,
            data,
        }
    }

    /// Raw frame bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.length as usize]
    }

    /// Frame length in bytes.
    pub fn len(&self) -> usize {
        self.length as usize
    }

    /// Whether the frame carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    const fn empty() -> Self {
        Self {
            timestamp_ms: 0,
            rssi_dbm: 0,
            snr_db: 0,
            length: 0,
            data: [0u8; MAX_FRAME_SIZE],
        }
    }
}

impl Default for CapturedFrame {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Debug, Default)]
struct StatsInner {
    total_received: AtomicU32,
    total_dropped: AtomicU32,
    occupancy: AtomicUsize,
}

/// Cloneable read-only view of the capture counters.
///
/// Counters are updated with relaxed atomics and independently of one
/// another; a reader racing an overflow eviction can observe a transient
/// mismatch between occupancy and the lifetime counters. Best-effort
/// reporting only; do not derive invariants across counters from one
/// read.
#[derive(Debug, Clone)]
pub struct CaptureStats {
    inner: Arc<StatsInner>,
}

impl CaptureStats {
    /// Lifetime count of frames stored, monotonically non-decreasing.
    pub fn total_received(&self) -> u32 {
        self.inner.total_received.load(Ordering::Relaxed)
    }

    /// Lifetime count of frames evicted by overwrite.
    pub fn total_dropped(&self) -> u32 {
        self.inner.total_dropped.load(Ordering::Relaxed)
    }

    /// Frames currently retained in the ring.
    pub fn occupancy(&self) -> usize {
        self.inner.occupancy.load(Ordering::Relaxed)
    }
}

/// Fixed-capacity ring store of [`CapturedFrame`] values.
///
/// Storage is allocated once up front; inserts move cursors, never memory.
pub struct CaptureBuffer {
    frames: Box<[CapturedFrame]>,
    write_index: usize,
    read_index: usize,
    count: usize,
    stats: Arc<StatsInner>,
}

impl CaptureBuffer {
    /// Create a buffer retaining up to `capacity` frames.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; configuration validation rejects
    /// that before a buffer is ever built.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capture buffer capacity must be non-zero");

        Self {
            frames: vec![CapturedFrame::empty(); capacity].into_boxed_slice(),
            write_index: 0,
            read_index: 0,
            count: 0,
            stats: Arc::new(StatsInner::default()),
        }
    }

    /// Store a frame, evicting the oldest when full.
    ///
    /// Never fails and never blocks. Eviction advances the read cursor by
    /// one and increments the lifetime dropped counter exactly once.
    pub fn add_frame(&mut self, frame: CapturedFrame) {
        if self.count >= self.frames.len() {
            self.read_index = (self.read_index + 1) % self.frames.len();
            self.count -= 1;
            self.stats.total_dropped.fetch_add(1, Ordering::Relaxed);
        }

        self.frames[self.write_index] = frame;
        self.write_index = (self.write_index + 1) % self.frames.len();
        self.count += 1;
        self.stats.total_received.fetch_add(1, Ordering::Relaxed);
        self.stats.occupancy.store(self.count, Ordering::Relaxed);
    }

    /// Fetch a retained frame by logical index; 0 is the oldest.
    ///
    /// Returns `None` once `index` reaches the current occupancy.
    pub fn frame(&self, index: usize) -> Option<&CapturedFrame> {
        if index >= self.count {
            return None;
        }

        let position = (self.read_index + index) % self.frames.len();
        Some(&self.frames[position])
    }

    /// Frames currently retained.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the ring currently retains no frames.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Maximum number of retained frames.
    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    /// Lifetime count of frames stored.
    pub fn total_received(&self) -> u32 {
        self.stats.total_received.load(Ordering::Relaxed)
    }

    /// Lifetime count of frames evicted by overwrite.
    pub fn total_dropped(&self) -> u32 {
        self.stats.total_dropped.load(Ordering::Relaxed)
    }

    /// Drop all retained frames. Lifetime counters are untouched.
    pub fn clear(&mut self) {
        self.write_index = 0;
        self.read_index = 0;
        self.count = 0;
        self.stats.occupancy.store(0, Ordering::Relaxed);
    }

    /// Cloneable counter view for an external reporting consumer.
    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            inner: Arc::clone(&self.stats),
        }
    }
}

impl std::fmt::Debug for CaptureBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureBuffer")
            .field("capacity", &self.frames.len())
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}
