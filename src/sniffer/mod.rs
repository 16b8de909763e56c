//! # Capture Loop Module
//!
//! The cooperative polling loop tying the radio, the capture ring, the
//! decoder, and the sink together.
//!
//! Concurrency model: all SPI transactions, ring mutation, decoding, and
//! publication happen on this one loop. The only code that
//! runs preemptively relative to it is the DIO1 edge callback, and that
//! callback does exactly one thing: raise [`PacketSignal`]. A periodic
//! poll backstops missed edges.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{interval, interval_at, Instant};
use tracing::{debug, info};

use crate::capture::{CaptureBuffer, CapturedFrame, MAX_FRAME_SIZE};
use crate::config::SnifferConfig;
use crate::crsf::decoder::decode_frame;
use crate::error::Result;
use crate::radio::bus::RadioBus;
use crate::radio::protocol::{IRQ_CRC_ERROR, IRQ_RX_DONE, RX_TIMEOUT_CONTINUOUS};
use crate::radio::Sx1280Driver;
use crate::sink::Sink;

#[derive(Debug, Default)]
struct SignalInner {
    raised: AtomicBool,
    notify: Notify,
}

/// Single-slot receive indicator between the edge callback and the loop.
///
/// Single writer (the callback), single reader (the loop). Raising is
/// lock-free and performs no I/O, so it is safe from interrupt context.
#[derive(Debug, Clone, Default)]
pub struct PacketSignal {
    inner: Arc<SignalInner>,
}

impl PacketSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a receive check is due and wake the loop.
    pub fn raise(&self) {
        self.inner.raised.store(true, Ordering::Release);
        self.inner.notify.notify_one();
    }

    /// Consume the pending indication, if any.
    pub fn take(&self) -> bool {
        self.inner.raised.swap(false, Ordering::Acquire)
    }

    /// Wait until the next [`raise`](Self::raise).
    pub async fn notified(&self) {
        self.inner.notify.notified().await
    }
}

/// The capture orchestrator: owns the radio driver, the ring buffer, and
/// the sink, and is their sole mutator.
pub struct Sniffer<B: RadioBus, S: Sink> {
    radio: Sx1280Driver<B>,
    buffer: CaptureBuffer,
    sink: S,
    signal: PacketSignal,
    poll_interval: Duration,
    status_interval: Duration,
    started: Instant,
}

impl<B: RadioBus, S: Sink> Sniffer<B, S> {
    pub fn new(
        radio: Sx1280Driver<B>,
        buffer: CaptureBuffer,
        sink: S,
        signal: PacketSignal,
        config: &SnifferConfig,
    ) -> Self {
        Self {
            radio,
            buffer,
            sink,
            signal,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            status_interval: Duration::from_secs(config.status_interval_s),
            started: Instant::now(),
        }
    }

    /// Read-side view of the capture ring (the reporting contract).
    pub fn buffer(&self) -> &CaptureBuffer {
        &self.buffer
    }

    /// Arm continuous reception and run the capture loop until Ctrl-C.
    pub async fn run(&mut self) -> Result<()> {
        self.radio.set_rx(RX_TIMEOUT_CONTINUOUS).await?;
        info!("listening in continuous RX mode");

        let signal = self.signal.clone();
        let mut poll = interval(self.poll_interval);
        let mut status = interval_at(
            Instant::now() + self.status_interval,
            self.status_interval,
        );

        loop {
            tokio::select! {
                _ = signal.notified() => {
                    signal.take();
                    self.service_radio().await?;
                }
                _ = poll.tick() => {
                    signal.take();
                    self.service_radio().await?;
                }
                _ = status.tick() => {
                    self.log_status();
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("received Ctrl+C, shutting down");
                    break;
                }
            }
        }

        self.log_status();
        Ok(())
    }

    /// Drain one round of radio events.
    ///
    /// On receive-complete: read signal metrics and the frame, append the
    /// raw capture to the ring (durable before any decode attempt), try to
    /// decode, publish, then acknowledge the interrupt and re-arm
    /// continuous reception.
    async fn service_radio(&mut self) -> Result<()> {
        let irq = self.radio.get_irq_status().await?;

        if irq & IRQ_RX_DONE != 0 {
            let (rssi_dbm, snr_db) = self.radio.get_packet_status().await?;
            let (length, start_offset) = self.radio.get_rx_buffer_status().await?;

            if length > 0 && length as usize <= MAX_FRAME_SIZE {
                let bytes = self.radio.read_buffer(start_offset, length).await?;
                let frame = CapturedFrame::new(self.elapsed_ms(), rssi_dbm, snr_db, &bytes);

                self.buffer.add_frame(frame);

                let channels = match decode_frame(frame.bytes()) {
                    Ok(channels) => channels,
                    Err(e) => {
                        debug!("frame not decoded: {e}");
                        None
                    }
                };

                self.sink.publish(&frame, channels.as_ref());
            } else {
                debug!("ignoring frame with reported length {length}");
            }

            self.radio
                .clear_irq_status(IRQ_RX_DONE | IRQ_CRC_ERROR)
                .await?;
            self.radio.set_rx(RX_TIMEOUT_CONTINUOUS).await?;
        }

        // Header-damaged frames assert CRC_ERROR without RX_DONE; nothing
        // to read, just acknowledge and re-arm
        if irq & IRQ_CRC_ERROR != 0 {
            debug!("radio reported CRC error");
            self.radio.clear_irq_status(IRQ_CRC_ERROR).await?;
            self.radio.set_rx(RX_TIMEOUT_CONTINUOUS).await?;
        }

        Ok(())
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn log_status(&self) {
        info!(
            "status: {} received, {} dropped, buffer {}/{}",
            self.buffer.total_received(),
            self.buffer.total_dropped(),
            self.buffer.len(),
            self.buffer.capacity(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crsf::crc::crc8;
    use crate::crsf::protocol::{CRSF_FRAMETYPE_RC_CHANNELS_PACKED, CRSF_SYNC_BYTE};
    use crate::radio::bus::mocks::MockRadioBus;
    use crate::radio::protocol::{
        CMD_CLR_IRQ_STATUS, CMD_GET_IRQ_STATUS, CMD_SET_RX,
    };
    use crate::sink::mocks::RecordingSink;

    /// Channel-data frame carrying channel 0 = 1000, channels 1-15 = 0.
    fn channels_frame() -> Vec<u8> {
        let mut payload = [0u8; 22];
        // 1000 = 0x3E8, packed LSB-first into the first 11 bits
        payload[0] = 0xE8;
        payload[1] = 0x03;

        let mut frame = vec![CRSF_SYNC_BYTE, 0x18, CRSF_FRAMETYPE_RC_CHANNELS_PACKED];
        frame.extend_from_slice(&payload);
        frame.push(crc8(&frame[2..]));
        frame
    }

    fn sniffer_with_mock() -> (
        Sniffer<MockRadioBus, RecordingSink>,
        MockRadioBus,
        RecordingSink,
    ) {
        let bus = MockRadioBus::new();
        let bus_handle = bus.clone();
        let sink = RecordingSink::new();
        let sink_handle = sink.clone();

        let sniffer = Sniffer::new(
            Sx1280Driver::new(bus),
            CaptureBuffer::new(8),
            sink,
            PacketSignal::new(),
            &SnifferConfig::default(),
        );

        (sniffer, bus_handle, sink_handle)
    }

    /// Queue the standard response sequence for one received frame.
    fn queue_rx_done(bus: &MockRadioBus, frame: &[u8], rssi_raw: u8, snr_raw: u8) {
        bus.queue_read(&[0x40, 0x00, 0x02]); // IRQ: RX_DONE
        bus.queue_read(&[0x40, 0x00, rssi_raw, snr_raw, 0x00, 0x00]); // packet status
        bus.queue_read(&[0x40, frame.len() as u8, 0x00]); // buffer status
        bus.queue_read(frame); // buffer contents
    }

    #[test]
    fn test_packet_signal_single_slot() {
        let signal = PacketSignal::new();

        assert!(!signal.take());
        signal.raise();
        signal.raise();
        assert!(signal.take());
        assert!(!signal.take());
    }

    #[tokio::test]
    async fn test_packet_signal_wakes_waiter() {
        let signal = PacketSignal::new();
        signal.raise();
        // The stored permit completes an already-pending wait immediately
        signal.notified().await;
        assert!(signal.take());
    }

    #[test]
    fn test_edge_callback_raises_signal() {
        let mut bus = MockRadioBus::new();
        let handle = bus.clone();
        let signal = PacketSignal::new();
        let raiser = signal.clone();

        bus.register_edge_callback(Box::new(move || raiser.raise()))
            .unwrap();

        assert!(!signal.take());
        handle.trigger_edge();
        assert!(signal.take());
    }

    #[tokio::test]
    async fn test_service_radio_captures_and_publishes() {
        let (mut sniffer, bus, sink) = sniffer_with_mock();
        let frame = channels_frame();
        // Raw RSSI 130 -> -65 dBm, raw SNR 20 -> 5 dB
        queue_rx_done(&bus, &frame, 130, 20);

        sniffer.service_radio().await.unwrap();

        // Raw capture is in the ring
        assert_eq!(sniffer.buffer().len(), 1);
        let captured = sniffer.buffer().frame(0).unwrap();
        assert_eq!(captured.bytes(), &frame[..]);
        assert_eq!(captured.rssi_dbm, -65);
        assert_eq!(captured.snr_db, 5);

        // Decoded channels reached the sink
        let published = sink.published();
        assert_eq!(published.len(), 1);
        let channels = published[0].1.expect("channel data expected");
        assert_eq!(channels.channels[0], 1000);
        assert_eq!(channels.channels[1..], [0u16; 15]);

        // Interrupt acknowledged, reception re-armed
        let writes = bus.written();
        let clear = &writes[writes.len() - 2];
        let rearm = &writes[writes.len() - 1];
        assert_eq!(clear, &vec![CMD_CLR_IRQ_STATUS, 0x00, 0x42]);
        assert_eq!(rearm, &vec![CMD_SET_RX, 0x00, 0xFF, 0xFF]);
    }

    #[tokio::test]
    async fn test_corrupt_frame_still_captured_raw() {
        let (mut sniffer, bus, sink) = sniffer_with_mock();
        let mut frame = channels_frame();
        let last = frame.len() - 1;
        frame[last] ^= 0xFF; // break the CRC trailer
        queue_rx_done(&bus, &frame, 140, 0);

        sniffer.service_radio().await.unwrap();

        // The raw frame is retained unchanged even though decoding failed
        assert_eq!(sniffer.buffer().len(), 1);
        assert_eq!(sniffer.buffer().frame(0).unwrap().bytes(), &frame[..]);

        let published = sink.published();
        assert_eq!(published.len(), 1);
        assert!(published[0].1.is_none());
    }

    #[tokio::test]
    async fn test_non_channel_frame_published_without_channels() {
        let (mut sniffer, bus, sink) = sniffer_with_mock();
        // CRC-valid link statistics frame
        let mut frame = vec![CRSF_SYNC_BYTE, 0x0C, 0x14];
        frame.extend_from_slice(&[0u8; 10]);
        frame.push(crc8(&frame[2..]));
        queue_rx_done(&bus, &frame, 120, 4);

        sniffer.service_radio().await.unwrap();

        assert_eq!(sniffer.buffer().len(), 1);
        assert!(sink.published()[0].1.is_none());
    }

    #[tokio::test]
    async fn test_no_events_means_no_work() {
        let (mut sniffer, bus, sink) = sniffer_with_mock();
        bus.queue_read(&[0x40, 0x00, 0x00]); // empty IRQ status

        sniffer.service_radio().await.unwrap();

        assert_eq!(sniffer.buffer().len(), 0);
        assert!(sink.published().is_empty());
        // Only the status poll went over the bus
        assert_eq!(bus.written(), vec![vec![CMD_GET_IRQ_STATUS]]);
    }

    #[tokio::test]
    async fn test_zero_length_frame_is_skipped() {
        let (mut sniffer, bus, sink) = sniffer_with_mock();
        bus.queue_read(&[0x40, 0x00, 0x02]); // RX_DONE
        bus.queue_read(&[0x40, 0x00, 130, 20, 0x00, 0x00]);
        bus.queue_read(&[0x40, 0x00, 0x00]); // zero-length frame

        sniffer.service_radio().await.unwrap();

        assert_eq!(sniffer.buffer().len(), 0);
        assert!(sink.published().is_empty());

        // Interrupt still acknowledged and RX re-armed
        let writes = bus.written();
        assert_eq!(
            writes[writes.len() - 2],
            vec![CMD_CLR_IRQ_STATUS, 0x00, 0x42]
        );
        assert_eq!(writes[writes.len() - 1], vec![CMD_SET_RX, 0x00, 0xFF, 0xFF]);
    }

    #[tokio::test]
    async fn test_crc_error_only_clears_and_rearms() {
        let (mut sniffer, bus, sink) = sniffer_with_mock();
        bus.queue_read(&[0x40, 0x00, 0x40]); // IRQ: CRC_ERROR only

        sniffer.service_radio().await.unwrap();

        assert!(sink.published().is_empty());
        let writes = bus.written();
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[1], vec![CMD_CLR_IRQ_STATUS, 0x00, 0x40]);
        assert_eq!(writes[2], vec![CMD_SET_RX, 0x00, 0xFF, 0xFF]);
    }

    #[tokio::test]
    async fn test_frames_append_in_completion_order() {
        let (mut sniffer, bus, _sink) = sniffer_with_mock();

        for marker in 1..=3u8 {
            let frame = vec![CRSF_SYNC_BYTE, 0x03, marker, 0x00, 0x00];
            queue_rx_done(&bus, &frame, 120, 0);
            sniffer.service_radio().await.unwrap();
        }

        assert_eq!(sniffer.buffer().len(), 3);
        for (index, marker) in (1..=3u8).enumerate() {
            assert_eq!(sniffer.buffer().frame(index).unwrap().bytes()[2], marker);
        }
    }
}
