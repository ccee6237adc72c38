//! # uinput Virtual Device
//!
//! Creates the virtual joystick through the legacy `uinput_user_dev`
//! protocol and writes input events to it.
//!
//! ## Bootstrap Sequence
//!
//! 1. Open `/dev/uinput` write-only and non-blocking
//! 2. `UI_SET_EVBIT(EV_ABS)`, then `UI_SET_ABSBIT` for wheel, gas and brake
//! 3. `UI_SET_EVBIT(EV_KEY)`, then `UI_SET_KEYBIT` for both gear buttons
//! 4. Fill in a `uinput_user_dev` with name, id and per-axis ranges
//! 5. Write it to the device
//! 6. `UI_DEV_CREATE`
//!
//! Dropping the device issues `UI_DEV_DESTROY` and closes the descriptor.

use evdev::{BusType, EventType, InputEvent};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use tracing::{debug, info, warn};

use super::sink::EventWriter;
use crate::config::DeviceConfig;
use crate::decoder::{Axis, Button};
use crate::error::{BootstrapStep, JoystickError, Result};

/// Default uinput control node
pub const UINPUT_PATH: &str = "/dev/uinput";

/// Size of the name field in `uinput_user_dev`, including the NUL
pub const UINPUT_MAX_NAME_SIZE: usize = 80;

/// Number of absolute axis slots (`ABS_CNT`)
const ABS_CNT: usize = 0x40;

const UINPUT_IOCTL_BASE: u8 = b'U';

nix::ioctl_none!(ui_dev_create, UINPUT_IOCTL_BASE, 1);
nix::ioctl_none!(ui_dev_destroy, UINPUT_IOCTL_BASE, 2);
nix::ioctl_write_int!(ui_set_evbit, UINPUT_IOCTL_BASE, 100);
nix::ioctl_write_int!(ui_set_keybit, UINPUT_IOCTL_BASE, 101);
nix::ioctl_write_int!(ui_set_absbit, UINPUT_IOCTL_BASE, 103);

/// Identity the virtual device presents to the input subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub name: String,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
}

impl DeviceIdentity {
    /// Bus type is always virtual
    pub fn bus_type(&self) -> BusType {
        BusType::BUS_VIRTUAL
    }
}

impl From<&DeviceConfig> for DeviceIdentity {
    fn from(config: &DeviceConfig) -> Self {
        Self {
            name: config.name.clone(),
            vendor: config.vendor,
            product: config.product,
            version: config.version,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
struct RawInputId {
    bustype: u16,
    vendor: u16,
    product: u16,
    version: u16,
}

/// `struct uinput_user_dev` from `<linux/uinput.h>`
#[repr(C)]
#[derive(Clone, Copy)]
struct UinputUserDev {
    name: [u8; UINPUT_MAX_NAME_SIZE],
    id: RawInputId,
    ff_effects_max: u32,
    absmax: [i32; ABS_CNT],
    absmin: [i32; ABS_CNT],
    absfuzz: [i32; ABS_CNT],
    absflat: [i32; ABS_CNT],
}

impl UinputUserDev {
    fn new(identity: &DeviceIdentity) -> Self {
        let mut dev = Self {
            name: [0; UINPUT_MAX_NAME_SIZE],
            id: RawInputId {
                bustype: identity.bus_type().0,
                vendor: identity.vendor,
                product: identity.product,
                version: identity.version,
            },
            ff_effects_max: 0,
            absmax: [0; ABS_CNT],
            absmin: [0; ABS_CNT],
            absfuzz: [0; ABS_CNT],
            absflat: [0; ABS_CNT],
        };

        // Always leave room for the terminating NUL
        let name = identity.name.as_bytes();
        let len = name.len().min(UINPUT_MAX_NAME_SIZE - 1);
        dev.name[..len].copy_from_slice(&name[..len]);

        for axis in Axis::ALL {
            let descriptor = axis.descriptor();
            let slot = usize::from(axis.code().0);
            dev.absmax[slot] = descriptor.max;
            dev.absmin[slot] = descriptor.min;
            dev.absfuzz[slot] = descriptor.fuzz;
            dev.absflat[slot] = descriptor.flat;
        }

        dev
    }

    fn as_bytes(&self) -> &[u8] {
        // SAFETY: repr(C) plain-old-data without padding
        unsafe {
            std::slice::from_raw_parts(
                (self as *const Self).cast::<u8>(),
                std::mem::size_of::<Self>(),
            )
        }
    }
}

/// Raw `struct input_event`; the kernel fills in the timestamp.
fn raw_event(event: &InputEvent) -> libc::input_event {
    libc::input_event {
        time: libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        },
        type_: event.event_type().0,
        code: event.code(),
        value: event.value(),
    }
}

fn event_bytes(raw: &libc::input_event) -> &[u8] {
    // SAFETY: input_event is a plain C struct
    unsafe {
        std::slice::from_raw_parts(
            (raw as *const libc::input_event).cast::<u8>(),
            std::mem::size_of::<libc::input_event>(),
        )
    }
}

/// A created uinput joystick.
///
/// Writes take `&self`, so one device can be shared between the main task
/// and the CAN callback thread.
pub struct UinputDevice {
    file: File,
    name: String,
}

impl std::fmt::Debug for UinputDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UinputDevice")
            .field("name", &self.name)
            .field("fd", &self.file.as_raw_fd())
            .finish()
    }
}

impl UinputDevice {
    /// Create the virtual joystick on `/dev/uinput`.
    ///
    /// # Errors
    ///
    /// Returns [`JoystickError::Bootstrap`] naming the step that failed.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use can_joystick::config::DeviceConfig;
    /// use can_joystick::uinput::device::{DeviceIdentity, UinputDevice};
    ///
    /// let device = UinputDevice::create(&DeviceIdentity::from(&DeviceConfig::default()))?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn create(identity: &DeviceIdentity) -> Result<Self> {
        Self::create_at(UINPUT_PATH, identity)
    }

    /// Create the virtual joystick through a specific uinput node.
    pub fn create_at<P: AsRef<Path>>(path: P, identity: &DeviceIdentity) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(|source| JoystickError::Bootstrap {
                step: BootstrapStep::Open,
                detail: path.display().to_string(),
                source,
            })?;
        debug!("Opened {}", path.display());

        let fd = file.as_raw_fd();

        enable(BootstrapStep::EnableEventClass, "abs", || unsafe {
            ui_set_evbit(fd, EventType::ABSOLUTE.0 as _)
        })?;
        for axis in Axis::ALL {
            enable(BootstrapStep::EnableAxis, axis.name(), || unsafe {
                ui_set_absbit(fd, axis.code().0 as _)
            })?;
        }

        enable(BootstrapStep::EnableEventClass, "key", || unsafe {
            ui_set_evbit(fd, EventType::KEY.0 as _)
        })?;
        for button in Button::ALL {
            enable(BootstrapStep::EnableKey, button.name(), || unsafe {
                ui_set_keybit(fd, button.key().code() as _)
            })?;
        }

        let dev = UinputUserDev::new(identity);
        (&file)
            .write_all(dev.as_bytes())
            .map_err(|source| JoystickError::Bootstrap {
                step: BootstrapStep::WriteIdentity,
                detail: identity.name.clone(),
                source,
            })?;

        enable(BootstrapStep::Create, &identity.name, || unsafe { ui_dev_create(fd) })?;

        info!(
            "Created virtual joystick '{}' ({:04x}:{:04x} v{})",
            identity.name, identity.vendor, identity.product, identity.version
        );

        Ok(Self {
            file,
            name: identity.name.clone(),
        })
    }

    /// Name the device was created with
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn enable<F>(step: BootstrapStep, detail: &str, op: F) -> Result<()>
where
    F: FnOnce() -> nix::Result<libc::c_int>,
{
    op().map(|_| ()).map_err(|errno| JoystickError::Bootstrap {
        step,
        detail: detail.to_string(),
        source: io::Error::from(errno),
    })
}

impl EventWriter for UinputDevice {
    fn write_event(&self, event: &InputEvent) -> io::Result<()> {
        let raw = raw_event(event);
        let bytes = event_bytes(&raw);
        let written = (&self.file).write(bytes)?;
        if written != bytes.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write: {} of {} bytes", written, bytes.len()),
            ));
        }
        Ok(())
    }
}

impl Drop for UinputDevice {
    fn drop(&mut self) {
        // SAFETY: fd is owned by self.file and still open
        if let Err(e) = unsafe { ui_dev_destroy(self.file.as_raw_fd()) } {
            warn!("Failed to destroy uinput device '{}': {}", self.name, e);
        } else {
            debug!("Destroyed uinput device '{}'", self.name);
        }
    }
}
