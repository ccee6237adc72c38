//! # CAN Bus Module
//!
//! Frame type and driver abstraction for the vehicle CAN bus.
//!
//! This module handles:
//! - The [`CanFrame`] value delivered by a driver callback
//! - The [`driver::CanDriver`] contract (init, configure, start, close)
//! - A SocketCAN backend for USB-CAN adapters exposed as `canN`

pub mod driver;
pub mod socket;

/// Mask selecting the 29-bit identifier from a raw CAN id word.
pub const CAN_EFF_MASK: u32 = 0x1FFF_FFFF;

/// Mask of a standard 11-bit identifier.
pub const CAN_SFF_MASK: u32 = 0x7FF;

/// Maximum payload length of a classic CAN frame.
pub const CAN_MAX_DLC: u8 = 8;

/// A classic CAN frame as delivered by the driver.
///
/// Only the first `dlc` bytes of `data` are defined; the rest are zero.
/// A 29-bit frame never compares equal to an 11-bit frame with the same
/// numeric identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    /// 11- or 29-bit identifier, without flag bits
    pub id: u32,
    /// Extended (29-bit) frame format
    pub extended: bool,
    /// Data length code (0-8)
    pub dlc: u8,
    /// Payload bytes
    pub data: [u8; 8],
}

impl CanFrame {
    /// Build a standard (11-bit) frame from an identifier and payload.
    ///
    /// The DLC is the payload length; bytes beyond the eighth are dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use can_joystick::can::CanFrame;
    ///
    /// let frame = CanFrame::new(0x1a1, &[0, 0, 0, 0, 0, 0, 0x80]);
    /// assert_eq!(frame.dlc, 7);
    /// assert_eq!(frame.payload()[6], 0x80);
    /// ```
    pub fn new(id: u32, payload: &[u8]) -> Self {
        let len = payload.len().min(CAN_MAX_DLC as usize);
        let mut data = [0u8; 8];
        data[..len].copy_from_slice(&payload[..len]);

        Self {
            id,
            extended: false,
            dlc: len as u8,
            data,
        }
    }

    /// Build an extended (29-bit) frame.
    pub fn new_extended(id: u32, payload: &[u8]) -> Self {
        Self {
            id: id & CAN_EFF_MASK,
            extended: true,
            ..Self::new(id, payload)
        }
    }

    /// The defined portion of the payload.
    pub fn payload(&self) -> &[u8] {
        let len = self.dlc.min(CAN_MAX_DLC) as usize;
        &self.data[..len]
    }
}
