//! Trait abstraction for the SPI bus and radio control lines to enable
//! host-side testing without hardware.

use std::io;

/// Capability interface over the SPI bus and the SX1280 control lines.
///
/// The driver frames each chip transaction itself: select, one or more
/// writes/reads, deselect. Implementations only move bytes and flip lines;
/// they never sequence commands.
pub trait RadioBus: Send {
    /// Write raw bytes while the chip is selected
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read raw bytes while the chip is selected
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<()>;

    /// Drive the chip-select line; `true` selects the chip
    fn set_select_line(&mut self, selected: bool);

    /// Drive the hardware reset line; `true` holds the chip in reset
    fn set_reset_line(&mut self, asserted: bool);

    /// Sample the busy handshake line; `true` while the chip is mid-operation
    fn read_busy_line(&self) -> bool;

    /// Install the receive-edge callback (DIO1 rising edge).
    ///
    /// The callback runs preemptively relative to the capture loop. It must
    /// stay trivially short: raise a flag and nothing else, no I/O, no buffer
    /// access.
    fn register_edge_callback(&mut self, callback: Box<dyn FnMut() + Send>) -> io::Result<()>;
}
