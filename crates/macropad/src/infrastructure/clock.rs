//! [`Clock`] implementations.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::application::dispatch_event::Clock;
use crate::infrastructure::journal::{Journal, JournalEntry};

/// Wall-clock time and real thread sleeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A clock that only moves when told to.
///
/// `sleep` returns immediately after advancing the clock by the requested
/// duration and recording it, so tests of debounce windows and reconnect
/// back-off run instantly.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
    /// Every duration passed to `sleep`, in order.
    pub sleeps: Mutex<Vec<Duration>>,
    pub journal: Option<Journal>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
            sleeps: Mutex::new(Vec::new()),
            journal: None,
        }
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clock that also records its sleeps in `journal`.
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            journal: Some(journal),
            ..Self::default()
        }
    }

    /// Moves time forward without recording a sleep.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }

    /// Total time spent in `sleep`.
    pub fn slept(&self) -> Duration {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .sum()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
        if let Some(journal) = &self.journal {
            journal.record(JournalEntry::Slept(duration));
        }
    }
}
