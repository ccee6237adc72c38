//! # Signal Decoders
//!
//! One [`SignalDecoder`] per CAN identifier. A decoder checks the frame's
//! DLC against the expected length and then extracts its field(s) with an
//! [`Extractor`].

use serde::Deserialize;
use thiserror::Error;

use super::{Axis, Button, ControlUpdate};
use crate::can::{CanFrame, CAN_EFF_MASK, CAN_MAX_DLC, CAN_SFF_MASK};
use crate::error::{JoystickError, Result};

/// Throttle (accelerator pedal) position
pub const THROTTLE_ID: u32 = 0x01a1;
/// Brake pedal position
pub const BRAKE_ID: u32 = 0x00f1;
/// Steering wheel angle
pub const STEERING_ID: u32 = 0x01e5;
/// Steering-column paddle shifters
pub const PADDLE_SHIFTER_ID: u32 = 0x01f3;

/// Paddle byte bit for the upshift paddle
pub const GEAR_UP_MASK: u8 = 0x01;
/// Paddle byte bit for the downshift paddle
pub const GEAR_DOWN_MASK: u8 = 0x02;

/// How a decoder pulls values out of a payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Extractor {
    /// One unsigned byte mapped onto an axis
    Unsigned8 { byte: usize, axis: Axis },
    /// Big-endian signed 16-bit value at `byte..byte + 2`, optionally negated
    Signed16Be {
        byte: usize,
        axis: Axis,
        #[serde(default)]
        invert: bool,
    },
    /// Individual bits of one byte mapped onto buttons
    BitButtons { byte: usize, buttons: Vec<BitButton> },
}

/// A button driven by a bit mask within a payload byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BitButton {
    pub mask: u8,
    pub button: Button,
}

impl Extractor {
    /// Highest payload byte index this extractor reads
    fn last_byte(&self) -> usize {
        match self {
            Extractor::Unsigned8 { byte, .. } => *byte,
            Extractor::Signed16Be { byte, .. } => byte + 1,
            Extractor::BitButtons { byte, .. } => *byte,
        }
    }

    fn extract(&self, data: &[u8; 8]) -> Vec<ControlUpdate> {
        match self {
            Extractor::Unsigned8 { byte, axis } => vec![ControlUpdate::Axis {
                axis: *axis,
                value: axis.clamp(i32::from(data[*byte])),
            }],
            Extractor::Signed16Be { byte, axis, invert } => {
                let raw = i16::from_be_bytes([data[*byte], data[byte + 1]]);
                // -(-0x8000) does not fit in an i16
                let value = if *invert { raw.saturating_neg() } else { raw };
                vec![ControlUpdate::Axis {
                    axis: *axis,
                    value: axis.clamp(i32::from(value)),
                }]
            }
            Extractor::BitButtons { byte, buttons } => buttons
                .iter()
                .map(|b| ControlUpdate::Button {
                    button: b.button,
                    pressed: data[*byte] & b.mask != 0,
                })
                .collect(),
        }
    }
}

/// A frame whose DLC does not match the decoder's expectation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("expected DLC {expected}, got {actual}")]
pub struct DlcMismatch {
    pub expected: u8,
    pub actual: u8,
}

/// Decoder bound to one CAN identifier.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SignalDecoder {
    /// Short signal name used in logs
    pub name: String,
    /// CAN identifier carrying the signal
    pub can_id: u32,
    /// Match 29-bit extended frames instead of 11-bit ones
    #[serde(default)]
    pub extended: bool,
    /// Required data length code
    pub dlc: u8,
    /// Diagnostic logged when a frame has the wrong DLC
    pub malformed: String,
    /// Field extraction rule
    pub extract: Extractor,
}

impl SignalDecoder {
    /// Decode a frame.
    ///
    /// # Errors
    ///
    /// Returns [`DlcMismatch`] if the frame length differs from `self.dlc`.
    ///
    /// # Examples
    ///
    /// ```
    /// use can_joystick::can::CanFrame;
    /// use can_joystick::decoder::{Axis, ControlUpdate};
    /// use can_joystick::decoder::signals::steering;
    ///
    /// let frame = CanFrame::new(0x1e5, &[0, 0x01, 0x00, 0, 0, 0, 0, 0]);
    /// let updates = steering().decode(&frame)?;
    /// assert_eq!(updates, vec![ControlUpdate::Axis { axis: Axis::Wheel, value: -0x100 }]);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn decode(&self, frame: &CanFrame) -> std::result::Result<Vec<ControlUpdate>, DlcMismatch> {
        if frame.dlc != self.dlc {
            return Err(DlcMismatch {
                expected: self.dlc,
                actual: frame.dlc,
            });
        }

        Ok(self.extract.extract(&frame.data))
    }

    /// Check that the decoder can be applied to frames of its declared DLC.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(JoystickError::InvalidConfig(format!("decoder '{}': {}", self.name, msg)));

        if self.name.is_empty() {
            return Err(JoystickError::InvalidConfig("decoder name cannot be empty".to_string()));
        }
        if self.extended && self.can_id > CAN_EFF_MASK {
            return invalid(format!("can_id 0x{:X} exceeds 29 bits", self.can_id));
        }
        if !self.extended && self.can_id > CAN_SFF_MASK {
            return invalid(format!(
                "can_id 0x{:X} exceeds 11 bits (set extended = true for 29-bit ids)",
                self.can_id
            ));
        }
        if self.dlc == 0 || self.dlc > CAN_MAX_DLC {
            return invalid(format!("dlc must be between 1 and 8, got {}", self.dlc));
        }
        if self.extract.last_byte() >= usize::from(self.dlc) {
            return invalid(format!(
                "extracts byte {} beyond dlc {}",
                self.extract.last_byte(),
                self.dlc
            ));
        }
        if let Extractor::BitButtons { buttons, .. } = &self.extract {
            if buttons.is_empty() {
                return invalid("bit_buttons needs at least one button".to_string());
            }
            if buttons.iter().any(|b| b.mask == 0) {
                return invalid("button mask cannot be zero".to_string());
            }
        }

        Ok(())
    }
}

/// Throttle decoder: byte 6 of a 7-byte frame onto the gas axis
pub fn throttle() -> SignalDecoder {
    SignalDecoder {
        name: "throttle".to_string(),
        can_id: THROTTLE_ID,
        extended: false,
        dlc: 7,
        malformed: "Malformed accelerator position".to_string(),
        extract: Extractor::Unsigned8 { byte: 6, axis: Axis::Gas },
    }
}

/// Brake decoder: byte 1 of a 6-byte frame onto the brake axis
pub fn brake() -> SignalDecoder {
    SignalDecoder {
        name: "brake".to_string(),
        can_id: BRAKE_ID,
        extended: false,
        dlc: 6,
        malformed: "Malformed brake position".to_string(),
        extract: Extractor::Unsigned8 { byte: 1, axis: Axis::Brake },
    }
}

/// Steering decoder: negated big-endian i16 at bytes 1-2 of an 8-byte frame
pub fn steering() -> SignalDecoder {
    SignalDecoder {
        name: "steering".to_string(),
        can_id: STEERING_ID,
        extended: false,
        dlc: 8,
        malformed: "Malformed steering position".to_string(),
        extract: Extractor::Signed16Be {
            byte: 1,
            axis: Axis::Wheel,
            invert: true,
        },
    }
}

/// Paddle decoder: bits 0 and 1 of byte 1 of a 3-byte frame
pub fn paddle_shifters() -> SignalDecoder {
    SignalDecoder {
        name: "paddle_shifters".to_string(),
        can_id: PADDLE_SHIFTER_ID,
        extended: false,
        dlc: 3,
        // Same label the vehicle tooling has always logged for paddle frames
        malformed: "Malformed steering position".to_string(),
        extract: Extractor::BitButtons {
            byte: 1,
            buttons: vec![
                BitButton { mask: GEAR_UP_MASK, button: Button::GearUp },
                BitButton { mask: GEAR_DOWN_MASK, button: Button::GearDown },
            ],
        },
    }
}

/// The decoder table for the supported vehicle
pub fn default_decoders() -> Vec<SignalDecoder> {
    vec![throttle(), brake(), steering(), paddle_shifters()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis_value(updates: &[ControlUpdate]) -> i32 {
        match updates {
            [ControlUpdate::Axis { value, .. }] => *value,
            other => panic!("Expected a single axis update, got: {:?}", other),
        }
    }

    /// Steering payload whose decoded (negated) value is `target`
    fn steering_frame(target: i16) -> CanFrame {
        let [hi, lo] = (-target).to_be_bytes();
        CanFrame::new(STEERING_ID, &[0, hi, lo, 0, 0, 0, 0, 0])
    }

    // ==================== Throttle ====================

    #[test]
    fn test_throttle_reads_byte_six() {
        let frame = CanFrame::new(THROTTLE_ID, &[0, 0, 0, 0, 0, 0, 0x80]);
        let updates = throttle().decode(&frame).unwrap();
        assert_eq!(updates, vec![ControlUpdate::Axis { axis: Axis::Gas, value: 0x80 }]);
    }

    #[test]
    fn test_throttle_ignores_other_bytes() {
        let frame = CanFrame::new(THROTTLE_ID, &[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x10]);
        assert_eq!(axis_value(&throttle().decode(&frame).unwrap()), 0x10);
    }

    #[test]
    fn test_throttle_full_range_in_bounds() {
        for raw in 0..=u8::MAX {
            let frame = CanFrame::new(THROTTLE_ID, &[0, 0, 0, 0, 0, 0, raw]);
            let value = axis_value(&throttle().decode(&frame).unwrap());
            assert!((0..=0xfe).contains(&value));
            if i32::from(raw) <= 0xfe {
                assert_eq!(value, i32::from(raw));
            }
        }
    }

    #[test]
    fn test_throttle_wrong_dlc() {
        let frame = CanFrame::new(THROTTLE_ID, &[0, 0, 0, 0, 0, 0]);
        assert_eq!(
            throttle().decode(&frame),
            Err(DlcMismatch { expected: 7, actual: 6 })
        );
    }

    // ==================== Brake ====================

    #[test]
    fn test_brake_reads_byte_one() {
        let frame = CanFrame::new(BRAKE_ID, &[0, 0x4b, 0, 0, 0, 0]);
        let updates = brake().decode(&frame).unwrap();
        assert_eq!(updates, vec![ControlUpdate::Axis { axis: Axis::Brake, value: 0x4b }]);
    }

    #[test]
    fn test_brake_clamps_above_limit() {
        let frame = CanFrame::new(BRAKE_ID, &[0, 0x90, 0, 0, 0, 0]);
        assert_eq!(axis_value(&brake().decode(&frame).unwrap()), 0x4b);
    }

    #[test]
    fn test_brake_wrong_dlc() {
        let frame = CanFrame::new(BRAKE_ID, &[0, 0x20, 0, 0, 0, 0, 0]);
        assert!(brake().decode(&frame).is_err());
    }

    // ==================== Steering ====================

    #[test]
    fn test_steering_positive_raw_is_negated() {
        let frame = CanFrame::new(STEERING_ID, &[0, 0x01, 0x00, 0, 0, 0, 0, 0]);
        assert_eq!(axis_value(&steering().decode(&frame).unwrap()), -0x0100);
    }

    #[test]
    fn test_steering_negative_raw_is_negated() {
        // 0xFF00 as i16 is -256
        let frame = CanFrame::new(STEERING_ID, &[0, 0xff, 0x00, 0, 0, 0, 0, 0]);
        assert_eq!(axis_value(&steering().decode(&frame).unwrap()), 0x0100);
    }

    #[test]
    fn test_steering_is_big_endian() {
        let frame = CanFrame::new(STEERING_ID, &[0, 0x00, 0x01, 0, 0, 0, 0, 0]);
        assert_eq!(axis_value(&steering().decode(&frame).unwrap()), -1);
    }

    #[test]
    fn test_steering_ignores_unused_bytes() {
        let frame = CanFrame::new(STEERING_ID, &[0xaa, 0x00, 0x10, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert_eq!(axis_value(&steering().decode(&frame).unwrap()), -0x10);
    }

    #[test]
    fn test_steering_most_negative_saturates_and_clamps() {
        let frame = CanFrame::new(STEERING_ID, &[0, 0x80, 0x00, 0, 0, 0, 0, 0]);
        assert_eq!(axis_value(&steering().decode(&frame).unwrap()), 0x1d00);
    }

    #[test]
    fn test_steering_clamps_to_axis_range() {
        let frame = CanFrame::new(STEERING_ID, &[0, 0x7f, 0xff, 0, 0, 0, 0, 0]);
        assert_eq!(axis_value(&steering().decode(&frame).unwrap()), -0x1d00);
    }

    #[test]
    fn test_steering_round_trip_within_range() {
        for target in [-0x1d00i16, -0x1234, -1, 0, 1, 0x0abc, 0x1d00] {
            let value = axis_value(&steering().decode(&steering_frame(target)).unwrap());
            assert_eq!(value, i32::from(target), "target {}", target);
        }
    }

    #[test]
    fn test_steering_wrong_dlc() {
        let frame = CanFrame::new(STEERING_ID, &[0, 0x01, 0x00]);
        assert_eq!(
            steering().decode(&frame),
            Err(DlcMismatch { expected: 8, actual: 3 })
        );
    }

    // ==================== Paddles ====================

    #[test]
    fn test_paddles_both_pressed() {
        let frame = CanFrame::new(PADDLE_SHIFTER_ID, &[0, 0x03, 0]);
        assert_eq!(
            paddle_shifters().decode(&frame).unwrap(),
            vec![
                ControlUpdate::Button { button: Button::GearUp, pressed: true },
                ControlUpdate::Button { button: Button::GearDown, pressed: true },
            ]
        );
    }

    #[test]
    fn test_paddles_always_emit_both_buttons() {
        for raw in 0..=u8::MAX {
            let frame = CanFrame::new(PADDLE_SHIFTER_ID, &[0, raw, 0]);
            let updates = paddle_shifters().decode(&frame).unwrap();
            assert_eq!(
                updates,
                vec![
                    ControlUpdate::Button { button: Button::GearUp, pressed: raw & 0x01 != 0 },
                    ControlUpdate::Button { button: Button::GearDown, pressed: raw & 0x02 != 0 },
                ]
            );
        }
    }

    #[test]
    fn test_paddles_released() {
        let frame = CanFrame::new(PADDLE_SHIFTER_ID, &[0xff, 0xfc, 0xff]);
        let updates = paddle_shifters().decode(&frame).unwrap();
        assert!(updates
            .iter()
            .all(|u| matches!(u, ControlUpdate::Button { pressed: false, .. })));
    }

    #[test]
    fn test_paddles_wrong_dlc() {
        let frame = CanFrame::new(PADDLE_SHIFTER_ID, &[0, 0x01]);
        assert!(paddle_shifters().decode(&frame).is_err());
    }

    #[test]
    fn test_paddle_malformed_label() {
        assert_eq!(paddle_shifters().malformed, "Malformed steering position");
    }

    // ==================== Table / validation ====================

    #[test]
    fn test_default_table_ids() {
        let ids: Vec<u32> = default_decoders().iter().map(|d| d.can_id).collect();
        assert_eq!(ids, vec![0x1a1, 0xf1, 0x1e5, 0x1f3]);
    }

    #[test]
    fn test_default_table_validates() {
        for decoder in default_decoders() {
            assert!(decoder.validate().is_ok(), "{} should be valid", decoder.name);
        }
    }

    #[test]
    fn test_validate_rejects_byte_beyond_dlc() {
        let mut decoder = throttle();
        decoder.dlc = 6;
        assert!(decoder.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_i16_straddling_dlc() {
        let mut decoder = steering();
        decoder.dlc = 2;
        assert!(decoder.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_dlc() {
        let mut decoder = brake();
        decoder.dlc = 0;
        assert!(decoder.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_dlc_above_eight() {
        let mut decoder = brake();
        decoder.dlc = 9;
        assert!(decoder.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_wide_id() {
        let mut decoder = brake();
        decoder.extended = true;
        decoder.can_id = 0x2000_0000;
        assert!(decoder.validate().is_err());
    }

    #[test]
    fn test_validate_standard_id_limited_to_11_bits() {
        let mut decoder = brake();
        decoder.can_id = 0x800;
        assert!(decoder.validate().is_err());

        decoder.extended = true;
        assert!(decoder.validate().is_ok());
    }

    #[test]
    fn test_default_table_is_standard_frames() {
        assert!(default_decoders().iter().all(|d| !d.extended));
    }

    #[test]
    fn test_validate_rejects_empty_buttons() {
        let mut decoder = paddle_shifters();
        decoder.extract = Extractor::BitButtons { byte: 1, buttons: vec![] };
        assert!(decoder.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_mask() {
        let mut decoder = paddle_shifters();
        decoder.extract = Extractor::BitButtons {
            byte: 1,
            buttons: vec![BitButton { mask: 0, button: Button::GearUp }],
        };
        assert!(decoder.validate().is_err());
    }

    #[test]
    fn test_deserialize_extractor() {
        let toml_content = r#"
name = "steering"
can_id = 0x1e5
dlc = 8
malformed = "Malformed steering position"

[extract]
kind = "signed16_be"
byte = 1
axis = "wheel"
invert = true
"#;
        let decoder: SignalDecoder = toml::from_str(toml_content).unwrap();
        assert_eq!(decoder, steering());
    }

    #[test]
    fn test_deserialize_invert_defaults_false() {
        let toml_content = r#"
kind = "signed16_be"
byte = 0
axis = "wheel"
"#;
        let extractor: Extractor = toml::from_str(toml_content).unwrap();
        assert_eq!(
            extractor,
            Extractor::Signed16Be { byte: 0, axis: Axis::Wheel, invert: false }
        );
    }
}
