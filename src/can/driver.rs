//! # CAN Driver Contract
//!
//! The interface the bridge consumes from a USB-CAN driver: one-shot library
//! initialization, per-bus configuration with a batch callback, start, and
//! close. The callback's context is whatever the handler closure captures.

use serde::Deserialize;
use std::fmt;

use super::CanFrame;
use crate::error::Result;

/// Nominal bitrate of the vehicle bus (500 kbit/s)
pub const DEFAULT_BITRATE: u32 = 500_000;

/// Bitrates a USB-CAN adapter can be asked for
pub const SUPPORTED_BITRATES: &[u32] = &[
    10_000, 20_000, 50_000, 100_000, 125_000, 250_000, 500_000, 800_000, 1_000_000,
];

/// Invoked with `(device_id, bus_id, frames)` for every delivered batch.
///
/// The frame slice is only valid for the duration of the call.
pub type BatchHandler = Box<dyn FnMut(u32, u32, &[CanFrame]) + Send>;

/// Invoked once when the driver loses the bus and stops delivering.
pub type FaultHandler = Box<dyn FnMut(std::io::Error) + Send>;

/// Acceptance filter: a frame passes when `frame.id & mask == id & mask`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FrameFilter {
    pub id: u32,
    pub mask: u32,
}

impl FrameFilter {
    /// Whether a frame identifier passes this filter
    pub fn accepts(&self, id: u32) -> bool {
        id & self.mask == self.id & self.mask
    }
}

/// Per-bus configuration handed to [`CanDriver::bus_init`].
pub struct BusConfig {
    /// Nominal bitrate in bit/s
    pub bitrate: u32,
    /// Hardware acceptance filters; empty means accept everything
    pub filters: Vec<FrameFilter>,
    /// Batch callback
    pub on_batch: BatchHandler,
    /// Optional bus-loss callback
    pub on_fault: Option<FaultHandler>,
}

impl BusConfig {
    pub fn new(bitrate: u32, on_batch: BatchHandler) -> Self {
        Self {
            bitrate,
            filters: Vec::new(),
            on_batch,
            on_fault: None,
        }
    }

    pub fn with_filters(mut self, filters: Vec<FrameFilter>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_fault_handler(mut self, on_fault: FaultHandler) -> Self {
        self.on_fault = Some(on_fault);
        self
    }
}

impl fmt::Debug for BusConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusConfig")
            .field("bitrate", &self.bitrate)
            .field("filters", &self.filters)
            .field("on_fault", &self.on_fault.is_some())
            .finish_non_exhaustive()
    }
}

/// A USB-CAN driver as seen by the bridge.
///
/// Call order is `library_init`, `bus_init`, `bus_start`, and finally
/// `library_close`, which must not return until no batch handler is running.
pub trait CanDriver {
    /// Process-global driver initialization.
    fn library_init(&mut self) -> Result<()>;

    /// Configure a bus and register its callbacks.
    fn bus_init(&mut self, device_id: u32, bus_id: u32, config: BusConfig) -> Result<()>;

    /// Begin delivering frames to the registered batch handler.
    fn bus_start(&mut self, device_id: u32, bus_id: u32) -> Result<()>;

    /// Stop delivery and release every bus resource.
    fn library_close(&mut self);
}
