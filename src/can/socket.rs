//! # SocketCAN Driver
//!
//! [`CanDriver`] backed by Linux SocketCAN. USB-CAN adapters (gs_usb,
//! slcan, PCAN-USB, ...) show up as `canN` network interfaces; the bitrate
//! is configured with `ip link`, not from here.
//!
//! A dedicated reader thread blocks for the first frame of a batch, drains
//! whatever else is already queued, and hands the batch to the registered
//! handler before reading again. Handler calls are therefore never
//! concurrent and never reordered.

use socketcan::{CanFilter, CanFrame as SocketFrame, CanSocket, EmbeddedFrame, Frame, Socket, SocketOptions};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use super::driver::{BusConfig, CanDriver, SUPPORTED_BITRATES};
use super::{CanFrame, CAN_EFF_MASK, CAN_SFF_MASK};
use crate::error::{JoystickError, Result};

/// Default SocketCAN interface
pub const DEFAULT_INTERFACE: &str = "can0";

/// Upper bound on frames handed to the handler in one batch
pub const MAX_BATCH_FRAMES: usize = 64;

/// How long the reader blocks before re-checking for shutdown
const READ_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A configured but not yet started bus
struct PendingBus {
    device_id: u32,
    bus_id: u32,
    socket: CanSocket,
    config: BusConfig,
}

/// A started bus and its reader thread
struct RunningBus {
    stop: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

/// SocketCAN-backed CAN driver handling a single bus.
pub struct SocketCanDriver {
    interface: String,
    initialized: bool,
    pending: Option<PendingBus>,
    running: Option<RunningBus>,
}

impl std::fmt::Debug for SocketCanDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketCanDriver")
            .field("interface", &self.interface)
            .field("initialized", &self.initialized)
            .field("running", &self.running.is_some())
            .finish_non_exhaustive()
    }
}

impl SocketCanDriver {
    /// Create a driver for the given interface (e.g. `can0`).
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            initialized: false,
            pending: None,
            running: None,
        }
    }

    /// Name of the SocketCAN interface this driver reads from
    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn open_socket(&self, config: &BusConfig) -> Result<CanSocket> {
        let socket = CanSocket::open(&self.interface).map_err(|e| {
            JoystickError::Can(format!(
                "Failed to open CAN interface '{}': {}",
                self.interface, e
            ))
        })?;

        if !config.filters.is_empty() {
            let filters: Vec<CanFilter> = config
                .filters
                .iter()
                .map(|f| CanFilter::new(f.id, f.mask))
                .collect();
            socket.set_filters(&filters).map_err(|e| {
                JoystickError::Can(format!(
                    "Failed to set filters on '{}': {}",
                    self.interface, e
                ))
            })?;
            debug!("Installed {} CAN filters on {}", filters.len(), self.interface);
        }

        socket
            .set_read_timeout(READ_POLL_INTERVAL)
            .map_err(|e| JoystickError::Can(format!("Failed to set read timeout: {}", e)))?;

        Ok(socket)
    }
}

impl CanDriver for SocketCanDriver {
    fn library_init(&mut self) -> Result<()> {
        if self.initialized {
            return Err(JoystickError::Can("driver already initialized".to_string()));
        }
        self.initialized = true;
        debug!("SocketCAN driver initialized for {}", self.interface);
        Ok(())
    }

    fn bus_init(&mut self, device_id: u32, bus_id: u32, config: BusConfig) -> Result<()> {
        if !self.initialized {
            return Err(JoystickError::Can("driver not initialized".to_string()));
        }
        if self.pending.is_some() || self.running.is_some() {
            return Err(JoystickError::Can(format!(
                "Failed to init listener on bus {}: only one bus is supported",
                bus_id
            )));
        }
        if !SUPPORTED_BITRATES.contains(&config.bitrate) {
            return Err(JoystickError::Can(format!(
                "Unsupported bitrate {} bit/s",
                config.bitrate
            )));
        }

        let socket = self.open_socket(&config)?;
        info!(
            "Opened {} for device {} bus {} (expecting {} bit/s, set via ip link)",
            self.interface, device_id, bus_id, config.bitrate
        );

        self.pending = Some(PendingBus {
            device_id,
            bus_id,
            socket,
            config,
        });
        Ok(())
    }

    fn bus_start(&mut self, device_id: u32, bus_id: u32) -> Result<()> {
        let pending = match self.pending.take() {
            Some(p) if p.device_id == device_id && p.bus_id == bus_id => p,
            other => {
                self.pending = other;
                return Err(JoystickError::Can(format!(
                    "Failed to start listening on bus {}: bus not initialized",
                    bus_id
                )));
            }
        };

        let stop = Arc::new(AtomicBool::new(false));
        let reader_stop = Arc::clone(&stop);
        let interface = self.interface.clone();

        let reader = std::thread::Builder::new()
            .name(format!("can-rx-{}", interface))
            .spawn(move || read_loop(pending, reader_stop, interface))
            .map_err(|e| JoystickError::Can(format!("Failed to spawn CAN reader: {}", e)))?;

        self.running = Some(RunningBus { stop, reader });
        info!("Listening on {} (device {} bus {})", self.interface, device_id, bus_id);
        Ok(())
    }

    fn library_close(&mut self) {
        self.pending = None;

        if let Some(running) = self.running.take() {
            running.stop.store(true, Ordering::SeqCst);
            if running.reader.join().is_err() {
                error!("CAN reader thread for {} panicked", self.interface);
            }
            debug!("CAN reader for {} stopped", self.interface);
        }

        self.initialized = false;
    }
}

impl Drop for SocketCanDriver {
    fn drop(&mut self) {
        self.library_close();
    }
}

/// Convert a SocketCAN data frame into the bridge's frame type.
///
/// Error and remote frames yield `None`. The frame format is kept.
fn convert_frame(frame: &SocketFrame) -> Option<CanFrame> {
    if frame.is_error_frame() || frame.is_remote_frame() {
        return None;
    }

    let mut converted = if frame.is_extended() {
        CanFrame::new_extended(frame.raw_id() & CAN_EFF_MASK, frame.data())
    } else {
        CanFrame::new(frame.raw_id() & CAN_SFF_MASK, frame.data())
    };
    converted.dlc = frame.dlc().min(8) as u8;
    Some(converted)
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// Drain frames already queued on the socket without blocking.
fn drain_queued(socket: &CanSocket, batch: &mut Vec<CanFrame>) -> io::Result<()> {
    socket.set_nonblocking(true)?;

    let result = loop {
        if batch.len() >= MAX_BATCH_FRAMES {
            break Ok(());
        }
        match socket.read_frame() {
            Ok(frame) => batch.extend(convert_frame(&frame)),
            Err(e) if is_timeout(&e) => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    socket.set_nonblocking(false)?;
    result
}

fn read_loop(mut bus: PendingBus, stop: Arc<AtomicBool>, interface: String) {
    let mut batch = Vec::with_capacity(MAX_BATCH_FRAMES);

    while !stop.load(Ordering::SeqCst) {
        batch.clear();

        let first = match bus.socket.read_frame() {
            Ok(frame) => frame,
            Err(e) if is_timeout(&e) => continue,
            Err(e) => {
                report_fault(&mut bus.config, &interface, e);
                return;
            }
        };
        batch.extend(convert_frame(&first));

        if let Err(e) = drain_queued(&bus.socket, &mut batch) {
            report_fault(&mut bus.config, &interface, e);
            return;
        }

        if batch.is_empty() {
            continue;
        }

        trace!("Delivering batch of {} frames from {}", batch.len(), interface);
        (bus.config.on_batch)(bus.device_id, bus.bus_id, &batch);
    }
}

fn report_fault(config: &mut BusConfig, interface: &str, e: io::Error) {
    error!("Lost CAN interface {}: {}", interface, e);
    match config.on_fault.as_mut() {
        Some(on_fault) => on_fault(e),
        None => warn!("No fault handler registered; CAN delivery stopped"),
    }
}
