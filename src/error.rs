//! # Error Types
//!
//! Custom error types for can-joystick using `thiserror`.

use std::fmt;

use thiserror::Error;

/// Steps of the virtual device bootstrap, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapStep {
    /// Opening `/dev/uinput`
    Open,
    /// Enabling an event class (`UI_SET_EVBIT`)
    EnableEventClass,
    /// Enabling an absolute axis code (`UI_SET_ABSBIT`)
    EnableAxis,
    /// Enabling a key code (`UI_SET_KEYBIT`)
    EnableKey,
    /// Writing the `uinput_user_dev` identity record
    WriteIdentity,
    /// Creating the device (`UI_DEV_CREATE`)
    Create,
}

impl fmt::Display for BootstrapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            BootstrapStep::Open => "open uinput",
            BootstrapStep::EnableEventClass => "enable event class",
            BootstrapStep::EnableAxis => "enable axis",
            BootstrapStep::EnableKey => "enable key",
            BootstrapStep::WriteIdentity => "write uinput descriptor",
            BootstrapStep::Create => "create uinput device",
        };
        f.write_str(step)
    }
}

/// Main error type for can-joystick
#[derive(Debug, Error)]
pub enum JoystickError {
    /// TOML parsing errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Semantically invalid configuration values
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Virtual device bootstrap failures
    #[error("Failed to {step} ({detail}): {source}")]
    Bootstrap {
        step: BootstrapStep,
        detail: String,
        #[source]
        source: std::io::Error,
    },

    /// CAN driver errors
    #[error("CAN driver error: {0}")]
    Can(String),

    /// Lifecycle transition that the state machine does not allow
    #[error("Invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition {
        from: crate::lifecycle::State,
        to: crate::lifecycle::State,
    },

    /// Failed write of an axis or button event
    #[error("Failed to write {what} event: {source}")]
    SinkWrite {
        what: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for can-joystick
pub type Result<T> = std::result::Result<T, JoystickError>;
