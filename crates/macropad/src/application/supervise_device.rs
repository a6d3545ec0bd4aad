//! DeviceSupervisor: owns the device session and the reconnect loop.
//!
//! # Loop structure (for beginners)
//!
//! ```text
//! settle 1s
//! while running:
//!     connect(descriptor)           ── first failure ever: fatal
//!     ├─ ok:  engine.start() once, then poll loop until unplug/shutdown
//!     └─ err: log and retry
//!     sleep 3s (interruptible)
//! ```
//!
//! The poll loop waits at most [`POLL_TIMEOUT`] for the device to become
//! readable, so a shutdown request is observed within one interval even when
//! nobody touches the device.  A read or poll error ends the session but not
//! the process: the outer loop sleeps [`RECONNECT_BACKOFF`] and connects
//! again, indefinitely.
//!
//! The [`EngineState`] is created once and kept across sessions, so the
//! active layer survives an unplug.

use std::collections::BTreeSet;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use macropad_core::{EffectiveFlags, HeldKeys, InputEvent, KeyId};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::dispatch_event::{EngineState, MacroEngine, VirtualOutput};

/// Upper bound on one wait for device input.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(250);

/// Pause between losing the device and the next connection attempt.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(3);

/// Pause before the first connection attempt, so the release of the key that
/// launched the daemon reaches the desktop before the device is grabbed.
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);

// ── Errors ────────────────────────────────────────────────────────────────────

/// Error type for device session operations.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no input device matches {0:?}")]
    NotFound(String),

    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to grab {path}: {source}")]
    Grab {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create virtual output device: {0}")]
    CreateOutput(#[source] std::io::Error),

    /// Transient: usually the device was unplugged.
    #[error("device read failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("device poll failed: {0}")]
    Poll(#[source] std::io::Error),
}

/// Error type for the supervisor as a whole.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The descriptor could not be opened on the very first attempt.
    #[error("cannot use device {descriptor:?}: {source}")]
    FatalDevice {
        descriptor: String,
        #[source]
        source: DeviceError,
    },
}

// ── Seams ─────────────────────────────────────────────────────────────────────

/// An opened physical input device.
pub trait InputSource: Send {
    /// Waits up to `timeout` for input.  Returns `Ok(false)` on timeout.
    fn wait_readable(&mut self, timeout: Duration) -> Result<bool, DeviceError>;

    /// Reads every event currently available, in arrival order.
    fn read_events(&mut self) -> Result<Vec<InputEvent>, DeviceError>;

    /// The keys the device currently reports as held.
    fn held_keys(&mut self) -> Result<HeldKeys, DeviceError>;
}

/// An opened input device paired with its virtual output device.
pub struct DeviceSession {
    /// Human-readable device description for logs.
    pub label: String,
    pub source: Box<dyn InputSource>,
    pub output: Box<dyn VirtualOutput>,
}

/// Resolves a device descriptor and opens a session on it.
pub trait DeviceConnector: Send {
    /// Opens the device named by `descriptor`, grabbing it when
    /// `flags.full_grab` is set, and creates the virtual output device.
    ///
    /// `output_keys` are added to the output device's key capabilities so
    /// every macro can emit its keys.
    fn connect(
        &mut self,
        descriptor: &str,
        flags: &EffectiveFlags,
        output_keys: &BTreeSet<KeyId>,
    ) -> Result<DeviceSession, DeviceError>;
}

// ── Supervisor ────────────────────────────────────────────────────────────────

/// Drives the engine from a physical device until shutdown.
pub struct DeviceSupervisor {
    connector: Box<dyn DeviceConnector>,
    engine: MacroEngine,
    descriptor: String,
    flags: EffectiveFlags,
    output_keys: BTreeSet<KeyId>,
    running: Arc<AtomicBool>,
}

impl DeviceSupervisor {
    /// Creates a supervisor.  Clearing `running` stops [`run`](Self::run)
    /// within one poll interval.
    pub fn new(
        connector: Box<dyn DeviceConnector>,
        engine: MacroEngine,
        descriptor: String,
        flags: EffectiveFlags,
        running: Arc<AtomicBool>,
    ) -> Self {
        let output_keys = engine.table().output_keys();
        Self {
            connector,
            engine,
            descriptor,
            flags,
            output_keys,
            running,
        }
    }

    /// Runs until shutdown is requested.
    ///
    /// Returns the final engine state, or `None` if shutdown came before the
    /// first session started.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::FatalDevice`] if the first connection
    /// attempt fails.  Later failures are retried indefinitely.
    pub fn run(&mut self) -> Result<Option<EngineState>, SupervisorError> {
        self.pause(SETTLE_DELAY);

        let mut state: Option<EngineState> = None;

        while self.is_running() {
            match self
                .connector
                .connect(&self.descriptor, &self.flags, &self.output_keys)
            {
                Ok(mut session) => {
                    info!("grabbing for remapping: {}", session.label);
                    let engine = &self.engine;
                    let state = state.get_or_insert_with(|| engine.start());
                    state.connected = true;
                    self.poll_session(&mut session, state);
                    state.connected = false;
                    state.held_keys.clear();
                }
                Err(source) if state.is_none() => {
                    return Err(SupervisorError::FatalDevice {
                        descriptor: self.descriptor.clone(),
                        source,
                    });
                }
                Err(e) => debug!("device {:?} still unavailable: {e}", self.descriptor),
            }

            if !self.is_running() {
                break;
            }
            warn!("Device probably was disconnected");
            println!("Device probably was disconnected");
            self.pause(RECONNECT_BACKOFF);
        }

        info!("supervisor stopped");
        Ok(state)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Polls one session until the device fails or shutdown is requested.
    fn poll_session(&self, session: &mut DeviceSession, state: &mut EngineState) {
        while self.is_running() {
            match session.source.wait_readable(POLL_TIMEOUT) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!("Device disconnected! ({e})");
                    return;
                }
            }

            let events = match session.source.read_events() {
                Ok(events) => events,
                Err(e) => {
                    warn!("Device disconnected! ({e})");
                    return;
                }
            };

            for event in events {
                match session.source.held_keys() {
                    Ok(held) => state.held_keys = held,
                    Err(e) => {
                        warn!("Device disconnected! ({e})");
                        return;
                    }
                }
                self.engine
                    .handle_event(state, event, session.output.as_mut());
            }
        }
    }

    /// Sleeps for `total` in slices of at most [`POLL_TIMEOUT`], returning
    /// early on shutdown.
    fn pause(&self, total: Duration) {
        let clock = self.engine.clock();
        let deadline = clock.now() + total;
        while self.is_running() {
            let now = clock.now();
            if now >= deadline {
                break;
            }
            clock.sleep((deadline - now).min(POLL_TIMEOUT));
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::input_device::mock::{
        MockDeviceConnector, MockInputSource, MockStep, MockVirtualOutput,
    };
    use crate::infrastructure::journal::{Journal, JournalEntry};
    use crate::infrastructure::process::mock::RecordingCommandRunner;
    use macropad_core::{Config, FlagOverrides};

    const TWO_LAYERS: &str = r#"{
        "dev_name": "USB Keypad",
        "layers": [["base", [183], "/usr/bin/true"], ["media", [184]]],
        "macros": { "media": [["play", [30], "key", [164]]] }
    }"#;

    struct Fixture {
        running: Arc<AtomicBool>,
        journal: Journal,
        clock: Arc<ManualClock>,
        commands: Arc<RecordingCommandRunner>,
    }

    impl Fixture {
        fn new() -> Self {
            let journal = Journal::new();
            Self {
                running: Arc::new(AtomicBool::new(true)),
                clock: Arc::new(ManualClock::with_journal(journal.clone())),
                commands: Arc::new(RecordingCommandRunner::with_journal(journal.clone())),
                journal,
            }
        }

        fn supervisor(&self, connector: MockDeviceConnector) -> DeviceSupervisor {
            let config = Config::from_json_str(TWO_LAYERS, &FlagOverrides::default()).unwrap();
            let engine = MacroEngine::new(
                config.table,
                false,
                self.commands.clone(),
                self.clock.clone(),
            );
            DeviceSupervisor::new(
                Box::new(connector),
                engine,
                "USB Keypad".to_string(),
                config.flags,
                Arc::clone(&self.running),
            )
        }

        fn session(&self, steps: Vec<MockStep>, output: &MockVirtualOutput) -> DeviceSession {
            DeviceSession {
                label: "mock keypad".to_string(),
                source: Box::new(MockInputSource::new(steps).with_clock(self.clock.clone())),
                output: Box::new(output.clone()),
            }
        }
    }

    fn key_press(code: u16, held: &[u16]) -> MockStep {
        MockStep::events(vec![(InputEvent::key_down(KeyId(code)), held.to_vec())])
    }

    #[test]
    fn test_first_connect_failure_is_fatal_and_engine_never_starts() {
        // Arrange
        let fx = Fixture::new();
        let connector = MockDeviceConnector::new(vec![Err(DeviceError::NotFound(
            "USB Keypad".into(),
        ))]);
        let mut supervisor = fx.supervisor(connector);

        // Act
        let result = supervisor.run();

        // Assert
        assert!(matches!(
            result,
            Err(SupervisorError::FatalDevice { ref descriptor, .. }) if descriptor == "USB Keypad"
        ));
        assert!(fx.commands.spawned().is_empty(), "no entry command before a session");
    }

    #[test]
    fn test_shutdown_before_start_returns_no_state() {
        let fx = Fixture::new();
        fx.running.store(false, Ordering::Relaxed);
        let mut supervisor = fx.supervisor(MockDeviceConnector::new(Vec::new()));

        let state = supervisor.run().unwrap();

        assert!(state.is_none());
        assert!(fx.journal.entries().is_empty());
    }

    #[test]
    fn test_settle_delay_precedes_first_connect() {
        let fx = Fixture::new();
        let output = MockVirtualOutput::new();
        let connector = MockDeviceConnector::new(vec![Ok(fx.session(Vec::new(), &output))])
            .with_journal(fx.journal.clone())
            .stop_when_exhausted(Arc::clone(&fx.running));
        let mut supervisor = fx.supervisor(connector);

        supervisor.run().unwrap();

        let entries = fx.journal.entries();
        let first_connect = entries
            .iter()
            .position(|e| matches!(e, JournalEntry::Connect(_)))
            .unwrap();
        let slept: Duration = entries[..first_connect]
            .iter()
            .filter_map(|e| match e {
                JournalEntry::Slept(d) => Some(*d),
                _ => None,
            })
            .sum();
        assert_eq!(slept, SETTLE_DELAY);
    }

    #[test]
    fn test_unplug_retries_every_backoff_until_device_returns() {
        // Arrange: one session that unplugs, two failed attempts, a second session
        let fx = Fixture::new();
        let output = MockVirtualOutput::new();
        let connector = MockDeviceConnector::new(vec![
            Ok(fx.session(vec![MockStep::Idle, MockStep::Unplug], &output)),
            Err(DeviceError::NotFound("USB Keypad".into())),
            Err(DeviceError::NotFound("USB Keypad".into())),
            Ok(fx.session(vec![MockStep::Unplug], &output)),
        ])
        .with_journal(fx.journal.clone())
        .stop_when_exhausted(Arc::clone(&fx.running));
        let mut supervisor = fx.supervisor(connector);

        // Act
        let state = supervisor.run().unwrap().unwrap();

        // Assert: every gap between connection attempts is one backoff
        let entries = fx.journal.entries();
        let connects: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, JournalEntry::Connect(_)))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(connects.len(), 5, "four scripted attempts plus the exhausted one");
        for pair in connects.windows(2) {
            let slept: Duration = entries[pair[0]..pair[1]]
                .iter()
                .filter_map(|e| match e {
                    JournalEntry::Slept(d) => Some(*d),
                    _ => None,
                })
                .sum();
            assert_eq!(slept, RECONNECT_BACKOFF);
        }
        assert!(!state.connected);
    }

    #[test]
    fn test_active_layer_survives_reconnect() {
        // Arrange: switch to "media", unplug, then press a media macro key
        let fx = Fixture::new();
        let output = MockVirtualOutput::new();
        let connector = MockDeviceConnector::new(vec![
            Ok(fx.session(
                vec![MockStep::Idle, key_press(184, &[184]), MockStep::Unplug],
                &output,
            )),
            Ok(fx.session(vec![key_press(30, &[30]), MockStep::Unplug], &output)),
        ])
        .stop_when_exhausted(Arc::clone(&fx.running));
        let mut supervisor = fx.supervisor(connector);

        // Act
        let state = supervisor.run().unwrap().unwrap();

        // Assert
        assert_eq!(state.active_layer, 1);
        assert_eq!(
            output.events(),
            vec![
                InputEvent::key_down(KeyId(164)),
                InputEvent::key_up(KeyId(164)),
                InputEvent::sync(),
            ]
        );
        assert_eq!(
            fx.commands.spawned(),
            vec![vec!["/usr/bin/true".to_string()]],
            "initial entry command runs once, not per session"
        );
    }

    #[test]
    fn test_unmatched_events_reach_the_session_output() {
        let fx = Fixture::new();
        let output = MockVirtualOutput::new();
        let batch = MockStep::events(vec![
            (InputEvent::key_down(KeyId(2)), vec![2]),
            (InputEvent::sync(), vec![2]),
        ]);
        let connector = MockDeviceConnector::new(vec![Ok(fx.session(
            vec![MockStep::Idle, batch, MockStep::Unplug],
            &output,
        ))])
        .stop_when_exhausted(Arc::clone(&fx.running));
        let mut supervisor = fx.supervisor(connector);

        supervisor.run().unwrap();

        assert_eq!(
            output.events(),
            vec![InputEvent::key_down(KeyId(2)), InputEvent::sync()]
        );
    }
}
