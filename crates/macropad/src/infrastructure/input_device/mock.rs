//! Scripted input devices and a recording output device for unit testing.
//!
//! - [`MockVirtualOutput`] records every written event.  Clones share the
//!   record, so a test can box one clone into a session and inspect the
//!   other afterwards.
//! - [`MockInputSource`] replays a list of [`MockStep`]s.
//! - [`MockDeviceConnector`] hands out prepared sessions or errors in order.

use std::collections::{BTreeSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use macropad_core::{EffectiveFlags, HeldKeys, InputEvent, KeyId};

use crate::application::dispatch_event::{OutputError, VirtualOutput};
use crate::application::supervise_device::{
    DeviceConnector, DeviceError, DeviceSession, InputSource,
};
use crate::infrastructure::clock::ManualClock;
use crate::infrastructure::journal::{Journal, JournalEntry};

// ── MockVirtualOutput ─────────────────────────────────────────────────────────

/// Records written events instead of injecting them.
#[derive(Debug, Clone, Default)]
pub struct MockVirtualOutput {
    written: Arc<Mutex<Vec<InputEvent>>>,
    /// When `true`, every write fails and nothing is recorded.
    pub should_fail: bool,
    pub journal: Option<Journal>,
}

impl MockVirtualOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(journal: Journal) -> Self {
        Self {
            journal: Some(journal),
            ..Self::default()
        }
    }

    /// A snapshot of the written events, oldest first.
    pub fn events(&self) -> Vec<InputEvent> {
        self.written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl VirtualOutput for MockVirtualOutput {
    fn write(&mut self, event: InputEvent) -> Result<(), OutputError> {
        if self.should_fail {
            return Err(OutputError::Write(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock output failure",
            )));
        }
        if let Some(journal) = &self.journal {
            journal.record(JournalEntry::Emitted(event));
        }
        self.written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }
}

// ── MockInputSource ───────────────────────────────────────────────────────────

/// One scripted answer to `wait_readable`.
#[derive(Debug, Clone)]
pub enum MockStep {
    /// The poll times out.
    Idle,
    /// The device disappears.
    Unplug,
    /// A batch of events, each with the keys held right after it.
    Events(Vec<(InputEvent, HeldKeys)>),
}

impl MockStep {
    /// Builds an [`MockStep::Events`] batch from raw held key codes.
    pub fn events(batch: Vec<(InputEvent, Vec<u16>)>) -> Self {
        MockStep::Events(
            batch
                .into_iter()
                .map(|(event, held)| (event, held.into_iter().map(KeyId).collect()))
                .collect(),
        )
    }
}

/// Replays scripted steps.  Once the script runs out it behaves as unplugged.
#[derive(Debug, Default)]
pub struct MockInputSource {
    steps: VecDeque<MockStep>,
    ready: VecDeque<(InputEvent, HeldKeys)>,
    held: VecDeque<HeldKeys>,
    clock: Option<Arc<ManualClock>>,
}

impl MockInputSource {
    pub fn new(steps: Vec<MockStep>) -> Self {
        Self {
            steps: steps.into(),
            ..Self::default()
        }
    }

    /// Makes every [`MockStep::Idle`] advance `clock` by the poll timeout.
    pub fn with_clock(mut self, clock: Arc<ManualClock>) -> Self {
        self.clock = Some(clock);
        self
    }
}

fn unplugged() -> DeviceError {
    DeviceError::Read(io::Error::new(io::ErrorKind::NotFound, "no such device"))
}

impl InputSource for MockInputSource {
    fn wait_readable(&mut self, timeout: Duration) -> Result<bool, DeviceError> {
        match self.steps.pop_front() {
            Some(MockStep::Idle) => {
                if let Some(clock) = &self.clock {
                    clock.advance(timeout);
                }
                Ok(false)
            }
            Some(MockStep::Events(batch)) => {
                self.ready.extend(batch);
                Ok(true)
            }
            Some(MockStep::Unplug) | None => Err(unplugged()),
        }
    }

    fn read_events(&mut self) -> Result<Vec<InputEvent>, DeviceError> {
        let mut events = Vec::with_capacity(self.ready.len());
        for (event, held) in self.ready.drain(..) {
            events.push(event);
            self.held.push_back(held);
        }
        Ok(events)
    }

    fn held_keys(&mut self) -> Result<HeldKeys, DeviceError> {
        Ok(self.held.pop_front().unwrap_or_default())
    }
}

// ── MockDeviceConnector ───────────────────────────────────────────────────────

/// Returns prepared connection results in order.
///
/// When the list is exhausted, further attempts fail with
/// [`DeviceError::NotFound`] and, if configured, clear the shutdown flag so
/// the supervisor stops.
#[derive(Default)]
pub struct MockDeviceConnector {
    outcomes: VecDeque<Result<DeviceSession, DeviceError>>,
    journal: Option<Journal>,
    stop: Option<Arc<AtomicBool>>,
    /// Every attempt's arguments, in order.  Clone the handle before boxing
    /// the connector to inspect it afterwards.
    pub requests: Arc<Mutex<Vec<ConnectRequest>>>,
}

/// The arguments of one `connect` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub descriptor: String,
    pub flags: EffectiveFlags,
    pub output_keys: BTreeSet<KeyId>,
}

impl MockDeviceConnector {
    pub fn new(outcomes: Vec<Result<DeviceSession, DeviceError>>) -> Self {
        Self {
            outcomes: outcomes.into(),
            ..Self::default()
        }
    }

    /// Records a [`JournalEntry::Connect`] for every attempt.
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Clears `running` on the first attempt past the prepared outcomes.
    pub fn stop_when_exhausted(mut self, running: Arc<AtomicBool>) -> Self {
        self.stop = Some(running);
        self
    }
}

impl DeviceConnector for MockDeviceConnector {
    fn connect(
        &mut self,
        descriptor: &str,
        flags: &EffectiveFlags,
        output_keys: &BTreeSet<KeyId>,
    ) -> Result<DeviceSession, DeviceError> {
        if let Some(journal) = &self.journal {
            journal.record(JournalEntry::Connect(descriptor.to_string()));
        }
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ConnectRequest {
                descriptor: descriptor.to_string(),
                flags: *flags,
                output_keys: output_keys.clone(),
            });

        match self.outcomes.pop_front() {
            Some(outcome) => outcome,
            None => {
                if let Some(running) = &self.stop {
                    running.store(false, Ordering::Relaxed);
                }
                Err(DeviceError::NotFound(descriptor.to_string()))
            }
        }
    }
}
