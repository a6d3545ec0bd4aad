//! Physical input devices and the virtual output device.
//!
//! The evdev implementation is Linux only and selected at compile time via
//! `#[cfg(target_os = "linux")]`.  Descriptor parsing and capability
//! selection are plain functions here so they can be tested anywhere.

pub mod mock;

#[cfg(target_os = "linux")]
pub mod linux;

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use macropad_core::keymap::linux_codes::{KEYBOARD_CODES, MOUSE_BUTTON_CODES};
use macropad_core::KeyId;

/// Name of the uinput device the daemon creates.
pub const OUTPUT_DEVICE_NAME: &str = "Macropad Output";

/// How the config's `dev_name` identifies the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceDescriptor {
    /// A device node path such as `/dev/input/event5`.
    Path(PathBuf),
    /// The exact name the device reports.
    Name(String),
}

impl DeviceDescriptor {
    /// Interprets a raw descriptor.
    ///
    /// - at most two characters: an event index, `"5"` → `/dev/input/event5`
    /// - contains `/dev/`: a path
    /// - anything else: an exact device name
    pub fn parse(raw: &str) -> Self {
        if raw.chars().count() <= 2 {
            DeviceDescriptor::Path(PathBuf::from(format!("/dev/input/event{raw}")))
        } else if raw.contains("/dev/") {
            DeviceDescriptor::Path(PathBuf::from(raw))
        } else {
            DeviceDescriptor::Name(raw.to_string())
        }
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceDescriptor::Path(path) => write!(f, "{}", path.display()),
            DeviceDescriptor::Name(name) => write!(f, "{name:?}"),
        }
    }
}

/// Key codes the virtual output device advertises.
///
/// With `cloned` set, the source device's own keys; otherwise a generic
/// keyboard-plus-mouse-buttons set.  `macro_keys` are always added so every
/// macro can emit its keys.
pub fn output_key_codes(
    cloned: Option<impl IntoIterator<Item = u16>>,
    macro_keys: &BTreeSet<KeyId>,
) -> BTreeSet<u16> {
    let mut codes: BTreeSet<u16> = match cloned {
        Some(source) => source.into_iter().collect(),
        None => KEYBOARD_CODES.chain(MOUSE_BUTTON_CODES).collect(),
    };
    codes.extend(macro_keys.iter().map(|k| k.0));
    codes
}
