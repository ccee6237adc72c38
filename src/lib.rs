//! # CAN Joystick Library
//!
//! Turn a car's steering wheel, pedals and paddle shifters into a Linux
//! joystick.
//!
//! This library decodes vehicle CAN frames and injects the resulting axis
//! and button events into a uinput virtual device.

pub mod bridge;
pub mod can;
pub mod config;
pub mod decoder;
pub mod error;
pub mod lifecycle;
pub mod pipeline;
pub mod uinput;
