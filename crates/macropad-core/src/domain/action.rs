//! What a macro does once its trigger matches.
//!
//! [`Action`] is a closed sum type; the executor in the daemon matches on it
//! exhaustively.  The config tags map to variants as follows:
//!
//! | Config tag  | Variant                   | Payload                          |
//! |-------------|---------------------------|----------------------------------|
//! | `"key"`     | [`Action::KeyTap`]        | one key                          |
//! | `"keylist"` | [`Action::KeyTapSequence`]| list of keys                     |
//! | `"keycomb"` | [`Action::KeyCombo`]      | script of [`ComboStep`]s         |
//! | `"button"`  | [`Action::RemapButton`]   | event value → key ([`ButtonMap`])|
//! | `"cmd"`     | [`Action::RunCommand`]    | argv list or program path        |
//! | `"dispose"` | [`Action::Dispose`]       | none                             |

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::domain::trigger::KeyId;

/// A macro's effect.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Press and release one key, then sync.
    KeyTap(KeyId),
    /// Press and release each key in order, then sync once.
    KeyTapSequence(Vec<KeyId>),
    /// Run a script of key downs, key ups, pauses, and tap groups.
    KeyCombo(Vec<ComboStep>),
    /// Translate the raw event's value (press/release/repeat) to another key.
    RemapButton(ButtonMap),
    /// Spawn a detached external command.
    RunCommand(CommandSpec),
    /// Swallow the event.
    Dispose,
}

impl Action {
    /// The config tag this action was declared with.
    pub fn tag(&self) -> &'static str {
        match self {
            Action::KeyTap(_) => "key",
            Action::KeyTapSequence(_) => "keylist",
            Action::KeyCombo(_) => "keycomb",
            Action::RemapButton(_) => "button",
            Action::RunCommand(_) => "cmd",
            Action::Dispose => "dispose",
        }
    }

    /// Keys this action may write to the virtual output device.
    pub fn output_keys(&self) -> Vec<KeyId> {
        match self {
            Action::KeyTap(key) => vec![*key],
            Action::KeyTapSequence(keys) => keys.clone(),
            Action::KeyCombo(steps) => steps
                .iter()
                .flat_map(|step| match step {
                    ComboStep::Down(k) | ComboStep::Up(k) => vec![*k],
                    ComboStep::Tap(keys) => keys.clone(),
                    ComboStep::Sleep(_) => Vec::new(),
                })
                .collect(),
            Action::RemapButton(map) => map.keys().collect(),
            Action::RunCommand(_) | Action::Dispose => Vec::new(),
        }
    }
}

/// One step of a [`Action::KeyCombo`] script.
#[derive(Debug, Clone, PartialEq)]
pub enum ComboStep {
    /// Press a key (positive code in config).
    Down(KeyId),
    /// Release a key (negative code in config).
    Up(KeyId),
    /// Sync, then block for the given duration (float seconds in config).
    Sleep(Duration),
    /// Tap each key in order, then sync (nested list in config).
    Tap(Vec<KeyId>),
}

/// Maps raw key event values (0 = release, 1 = press, 2 = repeat) to the
/// key that should be tapped instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ButtonMap {
    by_value: BTreeMap<i32, KeyId>,
}

impl ButtonMap {
    pub fn new(by_value: BTreeMap<i32, KeyId>) -> Self {
        Self { by_value }
    }

    /// The replacement key for an event with `value`, if one is configured.
    pub fn lookup(&self, value: i32) -> Option<KeyId> {
        self.by_value.get(&value).copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = KeyId> + '_ {
        self.by_value.values().copied()
    }
}

/// A command to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSpec {
    /// A single program path, run without arguments.
    Program(String),
    /// A full argument vector; the first element is the program.
    Argv(Vec<String>),
}

impl CommandSpec {
    /// The command as an argument vector.
    pub fn argv(&self) -> Vec<&str> {
        match self {
            CommandSpec::Program(program) => vec![program.as_str()],
            CommandSpec::Argv(args) => args.iter().map(String::as_str).collect(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}
