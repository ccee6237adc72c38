//! # Control Decoder Module
//!
//! Turns CAN frames carrying control-position telemetry into joystick
//! updates.
//!
//! ## Vehicle Layout
//!
//! | Signal | CAN ID | DLC | Field | Output |
//! |--------|--------|-----|-------|--------|
//! | Throttle | 0x01A1 | 7 | byte 6, u8 | Gas, 0..=0xFE |
//! | Brake | 0x00F1 | 6 | byte 1, u8 | Brake, 0..=0x4B |
//! | Steering | 0x01E5 | 8 | bytes 1-2, i16 big-endian, negated | Wheel, ±0x1D00 |
//! | Paddles | 0x01F3 | 3 | byte 1, bit 0 up / bit 1 down | GearUp, GearDown |
//!
//! The steering value is negated so that turning the wheel clockwise gives a
//! positive axis value.

pub mod dispatch;
pub mod signals;

use evdev::{AbsoluteAxisType, Key};
use serde::Deserialize;

/// Throttle axis maximum
pub const THROTTLE_LIMIT: i32 = 0xFE;

/// Brake axis maximum
pub const BRAKE_LIMIT: i32 = 0x4B;

/// Steering axis magnitude limit (range is symmetric around zero)
pub const STEERING_LIMIT: i32 = 0x1D00;

/// Joystick axes exposed by the virtual device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Wheel,
    Gas,
    Brake,
}

impl Axis {
    /// Every axis, in the order they are enabled on the device
    pub const ALL: [Axis; 3] = [Axis::Wheel, Axis::Gas, Axis::Brake];

    /// evdev absolute axis code
    pub fn code(self) -> AbsoluteAxisType {
        match self {
            Axis::Wheel => AbsoluteAxisType::ABS_WHEEL,
            Axis::Gas => AbsoluteAxisType::ABS_GAS,
            Axis::Brake => AbsoluteAxisType::ABS_BRAKE,
        }
    }

    /// Range, fuzz and flat declared for this axis at bootstrap
    pub fn descriptor(self) -> AxisDescriptor {
        let (min, max) = match self {
            Axis::Wheel => (-STEERING_LIMIT, STEERING_LIMIT),
            Axis::Gas => (0, THROTTLE_LIMIT),
            Axis::Brake => (0, BRAKE_LIMIT),
        };

        AxisDescriptor {
            axis: self,
            min,
            max,
            fuzz: 0,
            flat: 0,
        }
    }

    /// Clamp a raw value into this axis's declared range
    pub fn clamp(self, value: i32) -> i32 {
        let descriptor = self.descriptor();
        value.clamp(descriptor.min, descriptor.max)
    }

    pub fn name(self) -> &'static str {
        match self {
            Axis::Wheel => "wheel",
            Axis::Gas => "gas",
            Axis::Brake => "brake",
        }
    }
}

/// Momentary buttons exposed by the virtual device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    GearUp,
    GearDown,
}

impl Button {
    /// Every button, in the order they are enabled on the device
    pub const ALL: [Button; 2] = [Button::GearUp, Button::GearDown];

    /// evdev key code
    pub fn key(self) -> Key {
        match self {
            Button::GearUp => Key::BTN_GEAR_UP,
            Button::GearDown => Key::BTN_GEAR_DOWN,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Button::GearUp => "gear up",
            Button::GearDown => "gear down",
        }
    }
}

/// Static description of an absolute axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisDescriptor {
    pub axis: Axis,
    /// Inclusive minimum
    pub min: i32,
    /// Inclusive maximum
    pub max: i32,
    /// Noise-suppression hint
    pub fuzz: i32,
    /// Dead-zone hint
    pub flat: i32,
}

/// A single change produced by a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlUpdate {
    /// New absolute position of an axis, within its descriptor range
    Axis { axis: Axis, value: i32 },
    /// Current pressed state of a button
    Button { button: Button, pressed: bool },
}

impl ControlUpdate {
    /// Short name of the control, used in diagnostics
    pub fn control_name(&self) -> &'static str {
        match self {
            ControlUpdate::Axis { axis, .. } => axis.name(),
            ControlUpdate::Button { button, .. } => button.name(),
        }
    }
}
