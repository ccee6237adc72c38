//! # Bridge Wiring
//!
//! Connects a [`CanDriver`] to a [`Pipeline`] and waits for the bridge to
//! be told to stop.
//!
//! This module handles:
//! - Registering the batch and fault callbacks with the driver
//! - Bringing the bus up in driver call order
//! - Waiting for SIGINT, SIGTERM or a fatal pipeline fault

use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, trace};

use crate::can::driver::{BusConfig, CanDriver};
use crate::can::CanFrame;
use crate::config::CanConfig;
use crate::error::{JoystickError, Result};
use crate::lifecycle::Shutdown;
use crate::pipeline::{FaultSender, Pipeline};

/// Register callbacks and start frame delivery.
///
/// The batch handler owns a clone of `pipeline`; the fault handler forwards
/// driver read errors to `faults`.
///
/// # Errors
///
/// Returns the first driver error. The driver is not closed here.
pub fn attach<D: CanDriver>(
    driver: &mut D,
    can: &CanConfig,
    pipeline: Arc<Pipeline>,
    faults: FaultSender,
) -> Result<()> {
    driver.library_init()?;

    let on_batch = Box::new(move |device_id: u32, bus_id: u32, frames: &[CanFrame]| {
        let outcome = pipeline.process_batch(frames);
        trace!(
            "Bus {}:{} batch of {} frame(s): {:?}",
            device_id,
            bus_id,
            frames.len(),
            outcome
        );
    });

    let on_fault = Box::new(move |e: std::io::Error| {
        // Main may already be gone during teardown
        let _ = faults.send(JoystickError::Can(format!("read failed: {}", e)));
    });

    let config = BusConfig::new(can.bitrate, on_batch)
        .with_filters(can.filters.clone())
        .with_fault_handler(on_fault);

    driver.bus_init(can.device_id, can.bus_id, config)?;
    driver.bus_start(can.device_id, can.bus_id)?;

    info!(
        "Listening on {} (device {}, bus {}, {} bit/s)",
        can.interface, can.device_id, can.bus_id, can.bitrate
    );
    Ok(())
}

/// Wait for Ctrl+C, SIGTERM or a fault from the pipeline or driver.
///
/// Returns the shutdown reason and, for [`Shutdown::Fault`], the error.
pub async fn wait_for_shutdown(
    faults: &mut UnboundedReceiver<JoystickError>,
) -> Result<(Shutdown, Option<JoystickError>)> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;

    let outcome = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Received Ctrl+C");
            (Shutdown::Interrupt, None)
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
            (Shutdown::Terminate, None)
        }
        fault = faults.recv() => (Shutdown::Fault, fault),
    };

    Ok(outcome)
}
