//! # Frame Dispatcher
//!
//! Routes each CAN frame to the decoder registered for its identifier and
//! writes the resulting updates to the event sink.

use std::collections::HashMap;
use tracing::{trace, warn};

use super::signals::SignalDecoder;
use crate::can::CanFrame;
use crate::error::{JoystickError, Result};
use crate::uinput::sink::EventSink;

/// What happened to a single frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// No decoder for this identifier
    Unhandled,
    /// Decoded; this many updates were written
    Emitted(usize),
    /// Known identifier with the wrong DLC; nothing written
    Malformed,
}

impl Dispatch {
    /// Whether the frame counts towards the batch sync marker.
    ///
    /// Malformed frames on a known identifier still count.
    pub fn is_handled(self) -> bool {
        !matches!(self, Dispatch::Unhandled)
    }
}

/// Table key: identifier plus frame format
type DecoderKey = (u32, bool);

/// Identifier-to-decoder table.
///
/// Standard and extended frames are looked up separately, so a 29-bit
/// frame only reaches decoders declared `extended`.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    decoders: HashMap<DecoderKey, SignalDecoder>,
}

impl Dispatcher {
    /// Build a dispatcher from a decoder table.
    ///
    /// # Errors
    ///
    /// Returns [`JoystickError::InvalidConfig`] if a decoder is invalid or
    /// two decoders share an identifier.
    pub fn new(decoders: Vec<SignalDecoder>) -> Result<Self> {
        let mut table: HashMap<DecoderKey, SignalDecoder> = HashMap::with_capacity(decoders.len());

        for decoder in decoders {
            decoder.validate()?;
            let key = (decoder.can_id, decoder.extended);
            if let Some(existing) = table.get(&key) {
                return Err(JoystickError::InvalidConfig(format!(
                    "decoders '{}' and '{}' both use can_id 0x{:X}",
                    existing.name, decoder.name, decoder.can_id
                )));
            }
            table.insert(key, decoder);
        }

        Ok(Self { decoders: table })
    }

    /// Number of registered identifiers
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Whether a decoder is registered for this frame's identifier and format
    pub fn handles(&self, frame: &CanFrame) -> bool {
        self.decoders.contains_key(&(frame.id, frame.extended))
    }

    /// Decode one frame and emit its updates.
    ///
    /// DLC mismatches are logged with the decoder's diagnostic and dropped.
    ///
    /// # Errors
    ///
    /// Returns the sink error if an axis or button write fails.
    pub fn dispatch(&self, frame: &CanFrame, sink: &EventSink) -> Result<Dispatch> {
        let decoder = match self.decoders.get(&(frame.id, frame.extended)) {
            Some(decoder) => decoder,
            None => return Ok(Dispatch::Unhandled),
        };

        let updates = match decoder.decode(frame) {
            Ok(updates) => updates,
            Err(mismatch) => {
                warn!("{} ({})", decoder.malformed, mismatch);
                return Ok(Dispatch::Malformed);
            }
        };

        for update in &updates {
            trace!("0x{:03X} {} -> {:?}", frame.id, decoder.name, update);
            sink.emit(update)?;
        }

        Ok(Dispatch::Emitted(updates.len()))
    }
}
