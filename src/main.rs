//! # ELRS Sniffer
//!
//! Passive sniffer for ExpressLRS control links: an SPI-attached SX1280
//! in promiscuous mode captures over-air frames, which are CRC-validated,
//! decoded into RC channel values, and published for inspection.
//!
//! Capture requires the `rpi` feature (on by default) and an SX1280
//! module wired to SPI0; pin assignments live in the `[bus]` config
//! section.

use anyhow::Result;
use tracing::info;

use elrs_sniffer::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("ELRS sniffer v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args().nth(1);
    let config = Config::load_or_default(config_path.as_deref())?;

    info!(
        "tuning {} Hz, sf{}, {:?}, {:?}, preamble {}",
        config.radio.frequency_hz,
        config.radio.spreading_factor,
        config.radio.bandwidth,
        config.radio.coding_rate,
        config.radio.preamble_length,
    );

    run(config).await
}

#[cfg(feature = "rpi")]
async fn run(config: Config) -> Result<()> {
    use std::time::Duration;

    use elrs_sniffer::capture::CaptureBuffer;
    use elrs_sniffer::error::InitPhase;
    use elrs_sniffer::radio::bus::RadioBus;
    use elrs_sniffer::radio::rpi::RpiRadioBus;
    use elrs_sniffer::radio::Sx1280Driver;
    use elrs_sniffer::sink::build_sink;
    use elrs_sniffer::sniffer::{PacketSignal, Sniffer};

    let mut bus =
        RpiRadioBus::open(&config.bus).map_err(|e| e.during(InitPhase::RadioBringUp))?;

    // The edge callback only raises the signal; all radio and buffer work
    // stays on the capture loop
    let signal = PacketSignal::new();
    let raiser = signal.clone();
    bus.register_edge_callback(Box::new(move || raiser.raise()))
        .map_err(|e| elrs_sniffer::error::SnifferError::from(e).during(InitPhase::RadioBringUp))?;

    let mut radio = Sx1280Driver::with_busy_timeout(
        bus,
        Duration::from_millis(config.sniffer.busy_timeout_ms),
    );

    radio
        .begin()
        .await
        .map_err(|e| e.during(InitPhase::RadioBringUp))?;
    radio
        .enable_promiscuous_mode(&config.radio)
        .await
        .map_err(|e| e.during(InitPhase::PromiscuousConfig))?;

    let sink = build_sink(&config.output)?;
    let buffer = CaptureBuffer::new(config.capture.buffer_capacity);

    let mut sniffer = Sniffer::new(radio, buffer, sink, signal, &config.sniffer);
    sniffer.run().await?;

    Ok(())
}

#[cfg(not(feature = "rpi"))]
async fn run(_config: Config) -> Result<()> {
    anyhow::bail!("this build has no hardware bus support; rebuild with `--features rpi`")
}
