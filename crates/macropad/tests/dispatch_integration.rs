//! End-to-end dispatch tests: a realistic config file is parsed, merged and
//! validated, then events are fed through the engine with recording mocks.

use std::sync::Arc;
use std::time::Duration;

use macropad::application::dispatch_event::{EngineState, MacroEngine, Outcome, DEBOUNCE_WINDOW};
use macropad::infrastructure::clock::ManualClock;
use macropad::infrastructure::input_device::mock::MockVirtualOutput;
use macropad::infrastructure::journal::{Journal, JournalEntry};
use macropad::infrastructure::process::mock::RecordingCommandRunner;
use macropad_core::domain::event::EV_KEY;
use macropad_core::{Config, FlagOverrides, InputEvent, KeyId};

/// Two layers switched by G1/G2, a default that disposes Esc, a gaming layer
/// that overrides it, and one of each action type.
const DESK_PAD: &str = r#"{
    "dev_name": "USB Keypad",
    "mapping": { "G1": 183, "G2": 184, "DIAL": 48 },
    "layers": [
        ["base",   ["G1"], ["notify-send", "base"]],
        ["gaming", ["G2"], "/usr/bin/gamemoderun"]
    ],
    "macros": {
        "__default__": [
            ["no-esc", [1], "dispose"]
        ],
        "base": [
            ["copy",     ["KEY_LEFTCTRL", "KEY_C"], "key", ["KEY_COPY"]],
            ["greet",    [59], "keylist", ["KEY_H", "KEY_I"]],
            ["shot",     [60], "cmd", ["flameshot", "gui", "-p", "$HOME/shots"]],
            ["volume",   ["DIAL"], "button", { "1": "KEY_VOLUMEUP", "2": "KEY_VOLUMEUP" }]
        ],
        "gaming": [
            ["esc-tap",  [1], "key", [1]],
            ["sprint",   [42, 17], "keycomb", [42, 17, 0.05, -17, -42]]
        ]
    }
}"#;

const PAST_WINDOW: Duration = Duration::from_millis(300);

struct Pad {
    engine: MacroEngine,
    state: EngineState,
    output: MockVirtualOutput,
    clock: Arc<ManualClock>,
    commands: Arc<RecordingCommandRunner>,
    journal: Journal,
}

impl Pad {
    fn load(cli: FlagOverrides) -> Self {
        let config = Config::from_json_str(DESK_PAD, &cli).unwrap();
        let journal = Journal::new();
        let clock = Arc::new(ManualClock::with_journal(journal.clone()));
        let commands = Arc::new(RecordingCommandRunner::with_journal(journal.clone()));
        let engine = MacroEngine::new(
            config.table,
            config.flags.only_defined,
            commands.clone(),
            clock.clone(),
        );
        let state = engine.start();
        clock.advance(PAST_WINDOW);
        Self {
            engine,
            state,
            output: MockVirtualOutput::with_journal(journal.clone()),
            clock,
            commands,
            journal,
        }
    }

    fn send(&mut self, held: &[u16], event: InputEvent) -> Outcome {
        self.state.held_keys = held.iter().map(|&c| KeyId(c)).collect();
        self.engine.handle_event(&mut self.state, event, &mut self.output)
    }

    fn press(&mut self, held: &[u16], code: u16) -> Outcome {
        self.send(held, InputEvent::key_down(KeyId(code)))
    }

    fn switch_to(&mut self, trigger: u16) -> Outcome {
        self.clock.advance(PAST_WINDOW);
        let outcome = self.press(&[trigger], trigger);
        self.clock.advance(PAST_WINDOW);
        outcome
    }
}

fn tap(code: u16) -> [InputEvent; 2] {
    [InputEvent::key_down(KeyId(code)), InputEvent::key_up(KeyId(code))]
}

#[test]
fn test_startup_runs_first_layer_entry_command() {
    let pad = Pad::load(FlagOverrides::default());

    assert_eq!(
        pad.commands.spawned(),
        vec![vec!["notify-send".to_string(), "base".to_string()]]
    );
    assert_eq!(pad.state.active_layer, 0);
}

#[test]
fn test_key_names_resolve_through_aliases_and_builtin_table() {
    // Arrange: KEY_LEFTCTRL = 29, KEY_C = 46, KEY_COPY = 133
    let mut pad = Pad::load(FlagOverrides::default());

    // Act
    let outcome = pad.press(&[29, 46], 46);

    // Assert
    assert_eq!(outcome, Outcome::Executed("copy".into()));
    let mut expected = tap(133).to_vec();
    expected.push(InputEvent::sync());
    assert_eq!(pad.output.events(), expected);
}

#[test]
fn test_keylist_taps_each_key_then_syncs_once() {
    let mut pad = Pad::load(FlagOverrides::default());

    pad.press(&[59], 59);

    let mut expected = tap(35).to_vec(); // KEY_H
    expected.extend(tap(23)); // KEY_I
    expected.push(InputEvent::sync());
    assert_eq!(pad.output.events(), expected);
}

#[test]
fn test_default_dispose_applies_unless_layer_declares_same_trigger() {
    // Arrange
    let mut pad = Pad::load(FlagOverrides::default());

    // Act: Esc in base (inherits the default), then in gaming (overrides it)
    let in_base = pad.press(&[1], 1);
    pad.switch_to(184);
    let in_gaming = pad.press(&[1], 1);

    // Assert
    assert_eq!(in_base, Outcome::Disposed);
    assert_eq!(in_gaming, Outcome::Executed("esc-tap".into()));
    let mut expected = tap(1).to_vec();
    expected.push(InputEvent::sync());
    assert_eq!(pad.output.events(), expected);
}

#[test]
fn test_layer_switch_runs_scalar_entry_command_without_forwarding_trigger() {
    let mut pad = Pad::load(FlagOverrides::default());
    pad.commands.clear();

    let outcome = pad.switch_to(184);

    assert_eq!(outcome, Outcome::Consumed);
    assert_eq!(pad.state.active_layer, 1);
    assert_eq!(pad.commands.spawned(), vec![vec!["/usr/bin/gamemoderun".to_string()]]);
    assert!(pad.output.events().is_empty());
}

#[test]
fn test_rapid_double_switch_is_one_transition() {
    // Arrange
    let mut pad = Pad::load(FlagOverrides::default());
    pad.commands.clear();

    // Act: G2 then G1 well inside the window
    pad.press(&[184], 184);
    pad.clock.advance(DEBOUNCE_WINDOW / 2);
    pad.press(&[183], 183);

    // Assert
    assert_eq!(pad.state.active_layer, 1, "second switch ignored");
    assert_eq!(pad.commands.spawned().len(), 1);
}

#[test]
fn test_cmd_macro_hands_unexpanded_argv_to_runner() {
    let mut pad = Pad::load(FlagOverrides::default());
    pad.commands.clear();

    let outcome = pad.press(&[60], 60);

    assert_eq!(outcome, Outcome::Executed("shot".into()));
    assert_eq!(
        pad.commands.spawned(),
        vec![vec![
            "flameshot".to_string(),
            "gui".to_string(),
            "-p".to_string(),
            "$HOME/shots".to_string(),
        ]]
    );
    assert!(pad.output.events().is_empty());
}

#[test]
fn test_dial_button_maps_press_and_repeat_but_not_release() {
    // Arrange: the dial reports its own code, not a held key
    let mut pad = Pad::load(FlagOverrides::default());
    let dial = |value| InputEvent::new(EV_KEY, 48, value);

    // Act
    let pressed = pad.send(&[48], dial(1));
    let repeated = pad.send(&[48], dial(2));
    let released = pad.send(&[], dial(0));

    // Assert: KEY_VOLUMEUP = 115
    assert_eq!(pressed, Outcome::Remapped(KeyId(115)));
    assert_eq!(repeated, Outcome::Remapped(KeyId(115)));
    assert_eq!(released, Outcome::PassedThrough);
    let mut expected = Vec::new();
    for _ in 0..2 {
        expected.extend(tap(115));
        expected.push(InputEvent::sync());
    }
    expected.push(dial(0));
    assert_eq!(pad.output.events(), expected);
}

#[test]
fn test_combo_runs_steps_in_order_with_pause() {
    // Arrange
    let mut pad = Pad::load(FlagOverrides::default());
    pad.switch_to(184);
    let before = pad.journal.entries().len();

    // Act
    let outcome = pad.press(&[42, 17], 17);

    // Assert
    assert_eq!(outcome, Outcome::Executed("sprint".into()));
    assert_eq!(
        pad.journal.entries()[before..].to_vec(),
        vec![
            JournalEntry::Emitted(InputEvent::key_down(KeyId(42))),
            JournalEntry::Emitted(InputEvent::key_down(KeyId(17))),
            JournalEntry::Emitted(InputEvent::sync()),
            JournalEntry::Slept(Duration::from_millis(50)),
            JournalEntry::Emitted(InputEvent::sync()),
            JournalEntry::Emitted(InputEvent::key_up(KeyId(17))),
            JournalEntry::Emitted(InputEvent::key_up(KeyId(42))),
            JournalEntry::Emitted(InputEvent::sync()),
        ]
    );
}

#[test]
fn test_unmatched_keys_follow_only_defined_flag() {
    let mut forwarding = Pad::load(FlagOverrides::default());
    let mut strict = Pad::load(FlagOverrides {
        only_defined: Some(true),
        ..FlagOverrides::default()
    });
    let a = InputEvent::key_down(KeyId(30));

    assert_eq!(forwarding.send(&[30], a), Outcome::PassedThrough);
    assert_eq!(forwarding.output.events(), vec![a]);

    assert_eq!(strict.send(&[30], a), Outcome::Dropped);
    assert!(strict.output.events().is_empty());
}
