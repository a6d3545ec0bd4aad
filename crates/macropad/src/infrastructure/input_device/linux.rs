//! evdev/uinput adapter.
//!
//! - [`EvdevConnector`] resolves a descriptor, opens and optionally grabs the
//!   device, and builds the `"Macropad Output"` uinput device next to it.
//! - [`EvdevSource`] polls the device fd with a timeout and reads events in
//!   non-blocking mode.
//! - [`EvdevOutput`] buffers written events and injects them as one batch
//!   when a `SYN_REPORT` arrives.
//!
//! Requires read access to `/dev/input/event*` and write access to
//! `/dev/uinput` (typically membership in the `input` group plus a udev rule).

use std::collections::BTreeSet;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AbsInfo, AbsoluteAxisType, AttributeSet, Device, EventType, Key, UinputAbsSetup};
use macropad_core::{EffectiveFlags, HeldKeys, InputEvent, KeyId};
use tracing::{debug, info};

use super::{output_key_codes, DeviceDescriptor, OUTPUT_DEVICE_NAME};
use crate::application::dispatch_event::{OutputError, VirtualOutput};
use crate::application::supervise_device::{
    DeviceConnector, DeviceError, DeviceSession, InputSource,
};

// ── Connector ─────────────────────────────────────────────────────────────────

/// Opens real evdev devices.
#[derive(Debug, Default)]
pub struct EvdevConnector;

impl EvdevConnector {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceConnector for EvdevConnector {
    fn connect(
        &mut self,
        descriptor: &str,
        flags: &EffectiveFlags,
        output_keys: &BTreeSet<KeyId>,
    ) -> Result<DeviceSession, DeviceError> {
        let (path, mut device) = open_descriptor(&DeviceDescriptor::parse(descriptor))?;
        let shown = path.display().to_string();
        let label = format!("{} ({shown})", device.name().unwrap_or("unnamed device"));
        debug!("opened {label}");

        let output = EvdevOutput::create(flags.clone_capabilities.then_some(&device), output_keys)?;

        if flags.full_grab {
            device.grab().map_err(|source| DeviceError::Grab {
                path: shown.clone(),
                source,
            })?;
        }
        set_nonblocking(&device).map_err(|source| DeviceError::Open {
            path: shown,
            source,
        })?;

        Ok(DeviceSession {
            label,
            source: Box::new(EvdevSource { device }),
            output: Box::new(output),
        })
    }
}

fn open_descriptor(descriptor: &DeviceDescriptor) -> Result<(PathBuf, Device), DeviceError> {
    match descriptor {
        DeviceDescriptor::Path(path) => open_path(path).map(|device| (path.clone(), device)),
        DeviceDescriptor::Name(name) => evdev::enumerate()
            .find(|(_, device)| device.name() == Some(name.as_str()))
            .ok_or_else(|| DeviceError::NotFound(name.clone())),
    }
}

fn open_path(path: &Path) -> Result<Device, DeviceError> {
    Device::open(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => DeviceError::NotFound(path.display().to_string()),
        _ => DeviceError::Open {
            path: path.display().to_string(),
            source,
        },
    })
}

fn set_nonblocking(device: &Device) -> io::Result<()> {
    let raw_fd = device.as_raw_fd();

    let current = unsafe { libc::fcntl(raw_fd, libc::F_GETFL) };
    if current < 0 {
        return Err(io::Error::last_os_error());
    }
    let rc = unsafe { libc::fcntl(raw_fd, libc::F_SETFL, current | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

// ── Input side ────────────────────────────────────────────────────────────────

/// A non-blocking evdev device.
pub struct EvdevSource {
    device: Device,
}

impl InputSource for EvdevSource {
    fn wait_readable(&mut self, timeout: Duration) -> Result<bool, DeviceError> {
        let mut fds = [libc::pollfd {
            fd: self.device.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        }];
        let timeout_ms = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);

        let rc = unsafe { libc::poll(fds.as_mut_ptr(), 1, timeout_ms) };
        match rc {
            0 => Ok(false),
            n if n > 0 => Ok(true),
            _ => {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    Ok(false)
                } else {
                    Err(DeviceError::Poll(err))
                }
            }
        }
    }

    // After an unplug, poll reports the fd ready and the read fails with
    // ENODEV, which ends the session.
    fn read_events(&mut self) -> Result<Vec<InputEvent>, DeviceError> {
        match self.device.fetch_events() {
            Ok(events) => Ok(events
                .map(|ev| InputEvent::new(ev.event_type().0, ev.code(), ev.value()))
                .collect()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Vec::new()),
            Err(e) => Err(DeviceError::Read(e)),
        }
    }

    fn held_keys(&mut self) -> Result<HeldKeys, DeviceError> {
        let state = self.device.get_key_state().map_err(DeviceError::Read)?;
        Ok(state.iter().map(|key| KeyId(key.code())).collect())
    }
}

// ── Output side ───────────────────────────────────────────────────────────────

/// The uinput device events are injected through.
pub struct EvdevOutput {
    device: VirtualDevice,
    pending: Vec<evdev::InputEvent>,
}

impl EvdevOutput {
    /// Builds the output device.
    ///
    /// With `source` set, every capability it advertises is copied: keys,
    /// relative and absolute axes (with their ranges), misc events, switches,
    /// input properties and the input id.  Otherwise a generic
    /// keyboard-and-mouse-buttons device is created.  `macro_keys` are added
    /// either way.
    pub fn create(source: Option<&Device>, macro_keys: &BTreeSet<KeyId>) -> Result<Self, DeviceError> {
        let cloned_keys = source.map(|device| {
            device
                .supported_keys()
                .map(|keys| keys.iter().map(|key| key.code()).collect::<Vec<u16>>())
                .unwrap_or_default()
        });
        let mut keys = AttributeSet::<Key>::new();
        for code in output_key_codes(cloned_keys, macro_keys) {
            keys.insert(Key::new(code));
        }

        let mut builder = VirtualDeviceBuilder::new()
            .map_err(DeviceError::CreateOutput)?
            .name(OUTPUT_DEVICE_NAME)
            .with_keys(&keys)
            .map_err(DeviceError::CreateOutput)?;

        if let Some(device) = source {
            builder = builder.input_id(device.input_id());
            if let Some(axes) = device.supported_relative_axes() {
                builder = builder
                    .with_relative_axes(axes)
                    .map_err(DeviceError::CreateOutput)?;
            }
            if let Some(axes) = device.supported_absolute_axes() {
                let ranges = device.get_abs_state().map_err(DeviceError::CreateOutput)?;
                for axis in axes.iter() {
                    let setup = absolute_axis_setup(axis, &ranges[usize::from(axis.0)]);
                    builder = builder
                        .with_absolute_axis(&setup)
                        .map_err(DeviceError::CreateOutput)?;
                }
            }
            if let Some(misc) = device.misc_properties() {
                builder = builder.with_msc(misc).map_err(DeviceError::CreateOutput)?;
            }
            if let Some(switches) = device.supported_switches() {
                builder = builder
                    .with_switches(switches)
                    .map_err(DeviceError::CreateOutput)?;
            }
            builder = builder
                .with_properties(device.properties())
                .map_err(DeviceError::CreateOutput)?;
        }

        let device = builder.build().map_err(DeviceError::CreateOutput)?;
        info!(
            "created {OUTPUT_DEVICE_NAME:?} ({})",
            if source.is_some() { "cloned capabilities" } else { "generic capabilities" }
        );
        Ok(Self {
            device,
            pending: Vec::new(),
        })
    }
}

/// The uinput setup for one absolute axis, keeping the source's range.
fn absolute_axis_setup(axis: AbsoluteAxisType, range: &libc::input_absinfo) -> UinputAbsSetup {
    UinputAbsSetup::new(
        axis,
        AbsInfo::new(
            range.value,
            range.minimum,
            range.maximum,
            range.fuzz,
            range.flat,
            range.resolution,
        ),
    )
}

impl VirtualOutput for EvdevOutput {
    fn write(&mut self, event: InputEvent) -> Result<(), OutputError> {
        if event.is_sync_report() {
            // emit() appends the SYN_REPORT itself.
            let batch = std::mem::take(&mut self.pending);
            self.device.emit(&batch)?;
        } else {
            self.pending.push(evdev::InputEvent::new(
                EventType(event.kind),
                event.code,
                event.value,
            ));
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
