//! # Event Sink
//!
//! Writes decoded updates to the virtual device as evdev input events and
//! closes each batch with a `SYN_REPORT` marker.

use evdev::{EventType, InputEvent, Synchronization};
use std::io;
use std::sync::Arc;

use crate::decoder::ControlUpdate;
use crate::error::{JoystickError, Result};

/// Destination for raw input events.
///
/// Implemented by the uinput device; tests substitute recorders and mocks.
#[cfg_attr(test, mockall::automock)]
pub trait EventWriter: Send + Sync {
    /// Write exactly one input event record.
    fn write_event(&self, event: &InputEvent) -> io::Result<()>;
}

/// Translate an update into the input event that carries it.
///
/// # Examples
///
/// ```
/// use can_joystick::decoder::{Axis, ControlUpdate};
/// use can_joystick::uinput::sink::input_event;
/// use evdev::EventType;
///
/// let event = input_event(&ControlUpdate::Axis { axis: Axis::Gas, value: 0x80 });
/// assert_eq!(event.event_type(), EventType::ABSOLUTE);
/// assert_eq!(event.value(), 0x80);
/// ```
pub fn input_event(update: &ControlUpdate) -> InputEvent {
    match *update {
        ControlUpdate::Axis { axis, value } => {
            InputEvent::new(EventType::ABSOLUTE, axis.code().0, value)
        }
        ControlUpdate::Button { button, pressed } => {
            InputEvent::new(EventType::KEY, button.key().code(), i32::from(pressed))
        }
    }
}

/// The synchronization marker closing a group of events
pub fn sync_event() -> InputEvent {
    InputEvent::new(EventType::SYNCHRONIZATION, Synchronization::SYN_REPORT.0, 0)
}

/// Shared handle used to emit updates from the CAN callback.
#[derive(Clone)]
pub struct EventSink {
    writer: Arc<dyn EventWriter>,
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}

impl EventSink {
    pub fn new(writer: Arc<dyn EventWriter>) -> Self {
        Self { writer }
    }

    /// Write one axis or button event.
    ///
    /// # Errors
    ///
    /// Returns [`JoystickError::SinkWrite`] naming the control if the write
    /// fails; callers treat this as fatal.
    pub fn emit(&self, update: &ControlUpdate) -> Result<()> {
        self.writer
            .write_event(&input_event(update))
            .map_err(|source| JoystickError::SinkWrite {
                what: update.control_name().to_string(),
                source,
            })
    }

    /// Write a `SYN_REPORT` marker. Failures are not fatal.
    pub fn sync(&self) -> io::Result<()> {
        self.writer.write_event(&sync_event())
    }
}
