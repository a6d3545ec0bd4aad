//! MacroEngine: decides what happens to each input event.
//!
//! This use case is the Layer Controller, the Action Executor, and the
//! passthrough policy in one place.  It owns no device handles; the
//! supervisor passes the current session's [`VirtualOutput`] into every call.
//!
//! # Per-event pipeline (for beginners)
//!
//! For every event read from the device, with `held` being the keys the device
//! reports as currently down:
//!
//! 1. **Layer switch.** The first layer (in declaration order, across *all*
//!    layers) whose switch trigger is held becomes active, unless the last
//!    activation was less than [`DEBOUNCE_WINDOW`] ago.  The new layer's entry
//!    command is spawned.
//! 2. **Held-key macro.** The first macro of the active layer whose trigger is
//!    held is executed, again subject to the debounce window.  A debounced
//!    match still consumes the event.
//! 3. **Single-code fallback.** For key events with no held-key match, the
//!    layer is searched again with only the event's own code.  A `RemapButton`
//!    macro taps the key mapped to the event's value; a `Dispose` macro
//!    swallows the event.
//! 4. **Passthrough.** Anything still unmatched is forwarded unchanged, or
//!    dropped when `only_defined` is set.
//!
//! # Debounce
//!
//! Layer switches and macro firings share one window: an activation of
//! either kind is ignored when it comes within 250ms of the most recent
//! activation of either kind.  Both timestamps start at engine start.

use std::sync::Arc;
use std::time::{Duration, Instant};

use macropad_core::keymap::linux_codes::name_for_code;
use macropad_core::{Action, ComboStep, CommandSpec, HeldKeys, InputEvent, KeyId, Macro, MacroTable};
use thiserror::Error;
use tracing::{debug, error, info};

/// Minimum time between two activations (layer switches or macro firings).
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(250);

// ── Errors ────────────────────────────────────────────────────────────────────

/// Error type for writes to the virtual output device.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("virtual device write failed: {0}")]
    Write(#[from] std::io::Error),
}

/// Error type for spawning external commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command is empty")]
    Empty,
    #[error("failed to spawn {program:?}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

// ── Seams ─────────────────────────────────────────────────────────────────────

/// The synthesised output device.
///
/// Events written between two `SYN_REPORT` markers form one atomic batch for
/// downstream consumers.
pub trait VirtualOutput: Send {
    /// Queues or writes one event.
    fn write(&mut self, event: InputEvent) -> Result<(), OutputError>;

    /// Writes an `EV_SYN / SYN_REPORT` marker, completing the current batch.
    fn sync(&mut self) -> Result<(), OutputError> {
        self.write(InputEvent::sync())
    }
}

/// Spawns external commands without waiting for them.
pub trait CommandRunner: Send + Sync {
    /// Starts `command` detached from the daemon's process group.
    fn spawn_detached(&self, command: &CommandSpec) -> Result<(), CommandError>;
}

/// Source of time, and the only way the engine blocks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

// ── State ─────────────────────────────────────────────────────────────────────

/// Mutable state of the dispatch loop.
///
/// Owned by the supervisor's loop and passed by reference into the engine;
/// it survives device reconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineState {
    /// Index of the active layer in the macro table.
    pub active_layer: usize,
    /// Keys the device currently reports as held.
    pub held_keys: HeldKeys,
    pub last_layer_switch: Instant,
    pub last_macro_fire: Instant,
    /// Whether a device session is currently open.
    pub connected: bool,
}

impl EngineState {
    /// State at engine start: initial layer, nothing held, both activation
    /// timestamps set to `now`.
    pub fn new(table: &MacroTable, now: Instant) -> Self {
        Self {
            active_layer: table.initial_layer(),
            held_keys: HeldKeys::new(),
            last_layer_switch: now,
            last_macro_fire: now,
            connected: false,
        }
    }

    /// The most recent activation of either kind.
    pub fn last_activation(&self) -> Instant {
        self.last_layer_switch.max(self.last_macro_fire)
    }

    fn debounce_elapsed(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_activation()) >= DEBOUNCE_WINDOW
    }
}

/// What the engine did with one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A held-key macro ran.
    Executed(String),
    /// A held-key macro matched inside the debounce window; nothing ran.
    Debounced(String),
    /// A `RemapButton` macro tapped the mapped key instead.
    Remapped(KeyId),
    /// A `Dispose` macro swallowed the event.
    Disposed,
    /// Only a layer switch trigger matched; the event is not forwarded.
    Consumed,
    /// Unmatched and forwarded unchanged.
    PassedThrough,
    /// Unmatched and dropped because `only_defined` is set.
    Dropped,
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// The dispatch engine.
pub struct MacroEngine {
    table: MacroTable,
    only_defined: bool,
    commands: Arc<dyn CommandRunner>,
    clock: Arc<dyn Clock>,
}

impl MacroEngine {
    /// Creates an engine over an immutable macro table.
    pub fn new(
        table: MacroTable,
        only_defined: bool,
        commands: Arc<dyn CommandRunner>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            table,
            only_defined,
            commands,
            clock,
        }
    }

    pub fn table(&self) -> &MacroTable {
        &self.table
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Creates the loop state and runs the initial layer's entry command.
    ///
    /// Called once, when the first device session starts.
    pub fn start(&self) -> EngineState {
        let state = EngineState::new(&self.table, self.clock.now());
        let layer = self.table.layer(state.active_layer);
        info!("starting in layer {}", layer.name);
        if let Some(command) = &layer.entry_command {
            self.run_command(command, &layer.name);
        }
        state
    }

    /// Processes one event.  `state.held_keys` must already reflect the
    /// device's key state for this event.
    ///
    /// Output and spawn failures are logged and do not interrupt the caller.
    pub fn handle_event(
        &self,
        state: &mut EngineState,
        event: InputEvent,
        output: &mut dyn VirtualOutput,
    ) -> Outcome {
        let now = self.clock.now();

        let switch_matched = match self.table.match_switch(&state.held_keys) {
            Some(target) => {
                if state.debounce_elapsed(now) {
                    self.switch_layer(state, target, now);
                }
                true
            }
            None => false,
        };

        let layer = self.table.layer(state.active_layer);

        if let Some(m) = layer.match_held(&state.held_keys) {
            if !state.debounce_elapsed(now) {
                debug!("macro {} debounced", m.name);
                return Outcome::Debounced(m.name.clone());
            }
            state.last_macro_fire = now;
            if m.action == Action::Dispose {
                debug!("disposing of event: {}", m.name);
                return Outcome::Disposed;
            }
            debug!("executing macro {} ({}) in layer {}", m.name, m.action.tag(), layer.name);
            if let Err(e) = self.execute(m, &layer.name, output) {
                error!("macro {} in layer {}: {e}", m.name, layer.name);
            }
            return Outcome::Executed(m.name.clone());
        }

        if event.is_key() {
            if let Some(m) = layer.match_single(event.key_id()) {
                match &m.action {
                    Action::RemapButton(map) => {
                        if let Some(target) = map.lookup(event.value) {
                            debug!(
                                "button macro {}: value {} -> {}",
                                m.name,
                                event.value,
                                key_label(target)
                            );
                            if let Err(e) = tap(output, target).and_then(|()| output.sync()) {
                                error!("button macro {} in layer {}: {e}", m.name, layer.name);
                            }
                            return Outcome::Remapped(target);
                        }
                    }
                    Action::Dispose => {
                        debug!("disposing of event: {}", m.name);
                        return Outcome::Disposed;
                    }
                    _ => {}
                }
            }
        }

        if switch_matched {
            return Outcome::Consumed;
        }

        if self.only_defined {
            return Outcome::Dropped;
        }

        debug!("passthrough {event}");
        if let Err(e) = output.write(event) {
            error!("passthrough of {event}: {e}");
        }
        Outcome::PassedThrough
    }

    fn switch_layer(&self, state: &mut EngineState, target: usize, now: Instant) {
        state.active_layer = target;
        state.last_layer_switch = now;
        let layer = self.table.layer(target);
        info!("switched to layer {}", layer.name);
        if let Some(command) = &layer.entry_command {
            self.run_command(command, &layer.name);
        }
    }

    fn run_command(&self, command: &CommandSpec, context: &str) {
        debug!("{context}: running {command}");
        if let Err(e) = self.commands.spawn_detached(command) {
            error!("{context}: {e}");
        }
    }

    /// Executes a held-key macro's action.
    fn execute(
        &self,
        m: &Macro,
        layer: &str,
        output: &mut dyn VirtualOutput,
    ) -> Result<(), OutputError> {
        match &m.action {
            Action::KeyTap(key) => {
                tap(output, *key)?;
                output.sync()
            }
            Action::KeyTapSequence(keys) => {
                for key in keys {
                    tap(output, *key)?;
                }
                output.sync()
            }
            Action::KeyCombo(steps) => self.run_combo(steps, output),
            Action::RunCommand(command) => {
                self.run_command(command, &format!("macro {} in layer {layer}", m.name));
                Ok(())
            }
            // RemapButton only fires on the single-code path; Dispose never
            // reaches execution.
            Action::RemapButton(_) | Action::Dispose => Ok(()),
        }
    }

    fn run_combo(&self, steps: &[ComboStep], output: &mut dyn VirtualOutput) -> Result<(), OutputError> {
        for step in steps {
            match step {
                ComboStep::Down(key) => output.write(InputEvent::key_down(*key))?,
                ComboStep::Up(key) => output.write(InputEvent::key_up(*key))?,
                ComboStep::Sleep(duration) => {
                    output.sync()?;
                    self.clock.sleep(*duration);
                    output.sync()?;
                }
                ComboStep::Tap(keys) => {
                    for key in keys {
                        tap(output, *key)?;
                    }
                    output.sync()?;
                }
            }
        }
        output.sync()
    }
}

fn tap(output: &mut dyn VirtualOutput, key: KeyId) -> Result<(), OutputError> {
    output.write(InputEvent::key_down(key))?;
    output.write(InputEvent::key_up(key))
}

/// `KEY_VOLUMEUP (115)` for known codes, the bare number otherwise.
fn key_label(key: KeyId) -> String {
    match name_for_code(key.0) {
        Some(name) => format!("{name} ({key})"),
        None => key.to_string(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
