//! Ordered record of side effects shared by the recording mocks.
//!
//! `MockVirtualOutput`, `ManualClock`, `RecordingCommandRunner`, and
//! `MockDeviceConnector` can all be given a clone of the same [`Journal`].
//! Each appends to it as it is called, so a test can assert that, say, a
//! sync was emitted before a combo's pause started.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use macropad_core::InputEvent;

/// One recorded side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    /// An event written to a virtual output device.
    Emitted(InputEvent),
    /// A blocking sleep on the clock.
    Slept(Duration),
    /// A spawned command's argument vector.
    Spawned(Vec<String>),
    /// A connection attempt for the given descriptor.
    Connect(String),
}

/// A cheaply clonable handle to a shared entry list.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<JournalEntry>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: JournalEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    /// A snapshot of every entry so far, oldest first.
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
