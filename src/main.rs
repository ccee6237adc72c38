//! # CAN Joystick
//!
//! Turn a car's steering wheel, pedals and paddle shifters into a Linux
//! joystick.
//!
//! This application reads vehicle CAN frames from a SocketCAN interface and
//! replays them as a uinput virtual joystick.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc::unbounded_channel;
use tracing::info;
use tracing_subscriber::EnvFilter;

use can_joystick::bridge;
use can_joystick::can::driver::CanDriver;
use can_joystick::can::socket::SocketCanDriver;
use can_joystick::config::Config;
use can_joystick::decoder::dispatch::Dispatcher;
use can_joystick::lifecycle::{Lifecycle, Shutdown, State};
use can_joystick::pipeline::Pipeline;
use can_joystick::uinput::device::{DeviceIdentity, UinputDevice};
use can_joystick::uinput::sink::EventSink;

/// Main entry point for the CAN joystick bridge
///
/// # Control Flow
///
/// 1. **Booting**
///    - Set up logging with tracing subscriber
///    - Load configuration (`CAN_JOYSTICK_CONFIG` or built-in defaults)
///    - Create the uinput virtual joystick
///
/// 2. **Running**
///    - Bring up the CAN bus; batches are decoded on the driver thread
///    - Wait for Ctrl+C, SIGTERM or a fatal write failure
///
/// 3. **Terminated**
///    - Stop the driver and join its reader thread
///    - Log pipeline counters
///    - Destroy the virtual device
///
/// # Errors
///
/// Returns error (non-zero exit) if:
/// - Configuration cannot be loaded or is invalid
/// - Any virtual device bootstrap step fails
/// - The CAN bus cannot be started
/// - An axis or button write fails while running
///
/// # Examples
///
/// ```bash
/// sudo ip link set can0 up type can bitrate 500000
/// cargo run --release
/// ```
///
/// Expected output:
/// ```text
/// can-joystick v0.1.0 starting...
/// INFO can_joystick::uinput::device: Created virtual joystick 'Cadillac ELR' (0001:0001 v1)
/// INFO can_joystick::lifecycle: Lifecycle: booting -> running
/// INFO can_joystick::bridge: Listening on can0 (device 0, bus 0, 500000 bit/s)
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    // Printed before the subscriber so RUST_LOG cannot hide it
    eprintln!("{}", banner());

    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut lifecycle = Lifecycle::new();

    let (config, source) = Config::from_env().context("Failed to load configuration")?;
    match source {
        Some(path) => info!("Loaded configuration from {}", path),
        None => info!("Using built-in configuration"),
    }

    let dispatcher = Dispatcher::new(config.decoders.clone())?;
    info!("Decoding {} CAN identifiers", dispatcher.len());

    let device = match UinputDevice::create(&DeviceIdentity::from(&config.device)) {
        Ok(device) => Arc::new(device),
        Err(e) => {
            lifecycle.terminate(Shutdown::Fault);
            return Err(e.into());
        }
    };
    lifecycle.transition(State::Running)?;

    let (fault_tx, mut fault_rx) = unbounded_channel();
    let pipeline = Arc::new(Pipeline::new(
        dispatcher,
        EventSink::new(device.clone()),
        fault_tx.clone(),
    ));

    // Declared after the device so it is dropped (and joined) first
    let mut driver = SocketCanDriver::new(config.can.interface.clone());
    if let Err(e) = bridge::attach(&mut driver, &config.can, pipeline.clone(), fault_tx) {
        driver.library_close();
        lifecycle.terminate(Shutdown::Fault);
        return Err(e).context("Failed to start CAN bus");
    }

    info!("Press Ctrl+C to exit");

    let (reason, fault) = bridge::wait_for_shutdown(&mut fault_rx).await?;
    lifecycle.terminate(reason);
    driver.library_close();

    let stats = pipeline.stats().snapshot();
    info!(
        "{}: processed {} batches: {} handled, {} unhandled, {} malformed frames; {} events, {} sync failures",
        driver.interface(),
        stats.batches,
        stats.handled_frames,
        stats.unhandled_frames,
        stats.malformed_frames,
        stats.updates,
        stats.sync_failures
    );

    match fault {
        Some(e) => Err(e).context(format!("Virtual joystick '{}' stopped", device.name())),
        None => Ok(()),
    }
}

/// Startup banner
fn banner() -> String {
    format!("can-joystick v{} starting...", env!("CARGO_PKG_VERSION"))
}
