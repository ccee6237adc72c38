//! # Virtual Joystick Module
//!
//! Kernel-side output of the bridge.
//!
//! This module handles:
//! - Bootstrapping the uinput device (event classes, codes, identity, ranges)
//! - Writing axis, button and `SYN_REPORT` events
//! - Destroying the device on teardown

pub mod device;
pub mod sink;
