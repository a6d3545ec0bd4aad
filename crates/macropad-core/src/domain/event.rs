//! Raw input events as exchanged with the Linux input subsystem.
//!
//! Every event read from `/dev/input/eventN` (and every event written to a
//! uinput device) is a `(type, code, value)` triple:
//!
//! | Field   | Example            | Meaning                                   |
//! |---------|--------------------|-------------------------------------------|
//! | `kind`  | `EV_KEY` (1)       | Which event class this is                 |
//! | `code`  | `KEY_A` (30)       | Which key/axis within the class           |
//! | `value` | `1`                | For keys: 0 = release, 1 = press, 2 = repeat |
//!
//! A batch of events is terminated by an `EV_SYN / SYN_REPORT` event, which
//! tells consumers that the device state is now consistent.

use std::fmt;

use crate::domain::trigger::KeyId;

/// `EV_SYN`: synchronisation markers.
pub const EV_SYN: u16 = 0x00;
/// `EV_KEY`: key and button state changes.
pub const EV_KEY: u16 = 0x01;
/// `EV_REL`: relative axis motion (mouse movement, wheels).
pub const EV_REL: u16 = 0x02;

/// `SYN_REPORT`: end of an event batch.
pub const SYN_REPORT: u16 = 0;

/// Key event value for a release.
pub const KEY_RELEASE: i32 = 0;
/// Key event value for a press.
pub const KEY_PRESS: i32 = 1;

/// A single raw input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputEvent {
    /// Event type (`EV_KEY`, `EV_SYN`, ...).
    pub kind: u16,
    /// Event code within the type.
    pub code: u16,
    /// Event value.
    pub value: i32,
}

impl InputEvent {
    /// Creates an event from its raw parts.
    pub const fn new(kind: u16, code: u16, value: i32) -> Self {
        Self { kind, code, value }
    }

    /// A key press (`EV_KEY`, value 1).
    pub const fn key_down(key: KeyId) -> Self {
        Self::new(EV_KEY, key.0, KEY_PRESS)
    }

    /// A key release (`EV_KEY`, value 0).
    pub const fn key_up(key: KeyId) -> Self {
        Self::new(EV_KEY, key.0, KEY_RELEASE)
    }

    /// An `EV_SYN / SYN_REPORT` marker.
    pub const fn sync() -> Self {
        Self::new(EV_SYN, SYN_REPORT, 0)
    }

    /// Returns `true` for `EV_SYN / SYN_REPORT`.
    pub fn is_sync_report(&self) -> bool {
        self.kind == EV_SYN && self.code == SYN_REPORT
    }

    /// Returns `true` for `EV_KEY` events.
    pub fn is_key(&self) -> bool {
        self.kind == EV_KEY
    }

    /// The event's code interpreted as a key identifier.
    pub fn key_id(&self) -> KeyId {
        KeyId(self.code)
    }
}

impl fmt::Display for InputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TYPE:{} CODE:{} VALUE:{}", self.kind, self.code, self.value)
    }
}
