//! Raspberry Pi implementation of [`RadioBus`] over `rppal`.
//!
//! SPI0 in mode 0 with a GPIO-driven chip select: the SX1280 keeps NSS
//! asserted across the write and read halves of a transaction, which the
//! kernel's hardware chip select does not allow.

use std::io;

use rppal::gpio::{Gpio, InputPin, OutputPin, Trigger};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

use super::bus::RadioBus;
use crate::config::BusConfig;
use crate::error::{Result, SnifferError};

/// SPI bus and control pins of an attached SX1280 module.
pub struct RpiRadioBus {
    spi: Spi,
    nss: OutputPin,
    reset: OutputPin,
    busy: InputPin,
    dio1: InputPin,
}

impl RpiRadioBus {
    /// Open SPI0 and claim the configured control pins.
    ///
    /// Lines start in the quiescent state: chip deselected, reset
    /// released.
    pub fn open(config: &BusConfig) -> Result<Self> {
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, config.spi_clock_hz, Mode::Mode0)
            .map_err(|e| SnifferError::Bus(format!("failed to open SPI0: {e}")))?;

        let gpio = Gpio::new().map_err(|e| SnifferError::Bus(format!("failed to open GPIO: {e}")))?;

        let mut nss = Self::claim_output(&gpio, config.nss_pin, "NSS")?;
        nss.set_high();

        let mut reset = Self::claim_output(&gpio, config.reset_pin, "RESET")?;
        reset.set_high();

        let busy = Self::claim_input(&gpio, config.busy_pin, "BUSY")?;
        let dio1 = Self::claim_input(&gpio, config.dio1_pin, "DIO1")?;

        Ok(Self {
            spi,
            nss,
            reset,
            busy,
            dio1,
        })
    }

    fn claim_output(gpio: &Gpio, pin: u8, name: &str) -> Result<OutputPin> {
        Ok(gpio
            .get(pin)
            .map_err(|e| SnifferError::Bus(format!("failed to claim {name} pin {pin}: {e}")))?
            .into_output())
    }

    fn claim_input(gpio: &Gpio, pin: u8, name: &str) -> Result<InputPin> {
        Ok(gpio
            .get(pin)
            .map_err(|e| SnifferError::Bus(format!("failed to claim {name} pin {pin}: {e}")))?
            .into_input())
    }
}

impl RadioBus for RpiRadioBus {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.spi
            .write(data)
            .map(|_| ())
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn read(&mut self, buffer: &mut [u8]) -> io::Result<()> {
        self.spi
            .read(buffer)
            .map(|_| ())
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn set_select_line(&mut self, selected: bool) {
        // NSS is active low
        if selected {
            self.nss.set_low();
        } else {
            self.nss.set_high();
        }
    }

    fn set_reset_line(&mut self, asserted: bool) {
        // Reset is active low
        if asserted {
            self.reset.set_low();
        } else {
            self.reset.set_high();
        }
    }

    fn read_busy_line(&self) -> bool {
        self.busy.is_high()
    }

    fn register_edge_callback(&mut self, mut callback: Box<dyn FnMut() + Send>) -> io::Result<()> {
        self.dio1
            .set_async_interrupt(Trigger::RisingEdge, move |_| callback())
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}
