//! # Batch Pipeline
//!
//! The per-batch work done inside the CAN driver callback: dispatch every
//! frame in delivery order, then close the batch with a single `SYN_REPORT`
//! if any frame had a known identifier.
//!
//! A failed axis or button write is fatal. The pipeline stops writing and
//! reports the error on a fault channel so the main task can shut down;
//! it never exits the process from the driver's thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, warn};

use crate::can::CanFrame;
use crate::decoder::dispatch::{Dispatch, Dispatcher};
use crate::error::JoystickError;
use crate::uinput::sink::EventSink;

/// Sending half of the fault channel watched by the main task
pub type FaultSender = UnboundedSender<JoystickError>;

/// Running counters, updated from the driver thread.
#[derive(Debug, Default)]
pub struct PipelineStats {
    batches: AtomicU64,
    handled_frames: AtomicU64,
    unhandled_frames: AtomicU64,
    malformed_frames: AtomicU64,
    updates: AtomicU64,
    sync_failures: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub batches: u64,
    pub handled_frames: u64,
    pub unhandled_frames: u64,
    pub malformed_frames: u64,
    pub updates: u64,
    pub sync_failures: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            batches: self.batches.load(Ordering::Relaxed),
            handled_frames: self.handled_frames.load(Ordering::Relaxed),
            unhandled_frames: self.unhandled_frames.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            sync_failures: self.sync_failures.load(Ordering::Relaxed),
        }
    }

    fn record(&self, dispatch: Dispatch) {
        match dispatch {
            Dispatch::Unhandled => {
                self.unhandled_frames.fetch_add(1, Ordering::Relaxed);
            }
            Dispatch::Emitted(n) => {
                self.handled_frames.fetch_add(1, Ordering::Relaxed);
                self.updates.fetch_add(n as u64, Ordering::Relaxed);
            }
            Dispatch::Malformed => {
                self.handled_frames.fetch_add(1, Ordering::Relaxed);
                self.malformed_frames.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Result of processing one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// No frame had a known identifier; nothing written
    Ignored,
    /// Updates written and the batch closed with a sync marker
    Synced,
    /// Updates written but the sync marker write failed
    SyncFailed,
    /// An update write failed; the pipeline is now stopped
    Fatal,
    /// The pipeline had already stopped; the batch was dropped
    Stopped,
}

/// Dispatcher, sink and counters shared with the driver callback.
#[derive(Debug)]
pub struct Pipeline {
    dispatcher: Dispatcher,
    sink: EventSink,
    stats: PipelineStats,
    faults: FaultSender,
    failed: AtomicBool,
}

impl Pipeline {
    pub fn new(dispatcher: Dispatcher, sink: EventSink, faults: FaultSender) -> Self {
        Self {
            dispatcher,
            sink,
            stats: PipelineStats::default(),
            faults,
            failed: AtomicBool::new(false),
        }
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Whether a fatal write has stopped the pipeline
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Process one driver batch.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use can_joystick::can::CanFrame;
    /// use can_joystick::decoder::dispatch::Dispatcher;
    /// use can_joystick::decoder::signals::default_decoders;
    /// use can_joystick::pipeline::{BatchOutcome, Pipeline};
    /// use can_joystick::uinput::sink::{EventSink, EventWriter};
    ///
    /// struct Discard;
    /// impl EventWriter for Discard {
    ///     fn write_event(&self, _: &evdev::InputEvent) -> std::io::Result<()> { Ok(()) }
    /// }
    ///
    /// let (faults, _rx) = tokio::sync::mpsc::unbounded_channel();
    /// let pipeline = Pipeline::new(
    ///     Dispatcher::new(default_decoders())?,
    ///     EventSink::new(Arc::new(Discard)),
    ///     faults,
    /// );
    ///
    /// let batch = [CanFrame::new(0x1a1, &[0, 0, 0, 0, 0, 0, 0x80])];
    /// assert_eq!(pipeline.process_batch(&batch), BatchOutcome::Synced);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn process_batch(&self, frames: &[CanFrame]) -> BatchOutcome {
        if self.has_failed() {
            return BatchOutcome::Stopped;
        }
        self.stats.batches.fetch_add(1, Ordering::Relaxed);

        let mut handled = false;
        for frame in frames {
            match self.dispatcher.dispatch(frame, &self.sink) {
                Ok(dispatch) => {
                    self.stats.record(dispatch);
                    handled |= dispatch.is_handled();
                }
                Err(e) => {
                    self.fail(e);
                    return BatchOutcome::Fatal;
                }
            }
        }

        if !handled {
            return BatchOutcome::Ignored;
        }

        match self.sink.sync() {
            Ok(()) => BatchOutcome::Synced,
            Err(e) => {
                self.stats.sync_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Failed to write sync event: {}", e);
                BatchOutcome::SyncFailed
            }
        }
    }

    fn fail(&self, e: JoystickError) {
        // Only the first failure is reported
        if self.failed.swap(true, Ordering::SeqCst) {
            return;
        }
        error!("{}", e);
        if self.faults.send(e).is_err() {
            error!("Fault channel closed; main task already gone");
        }
    }
}
