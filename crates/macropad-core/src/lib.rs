//! # macropad-core
//!
//! Shared library for UInput-Macropad containing the macro table, the
//! key-trigger matcher, key name tables, and the configuration schema.
//!
//! This crate has zero dependencies on OS APIs or input devices.  The daemon
//! crate (`macropad`) wires it to evdev/uinput and to process spawning.
//!
//! # Architecture overview (for beginners)
//!
//! UInput-Macropad turns a spare keyboard or keypad into a macro pad.  The
//! daemon grabs the physical device, looks at which keys are currently held
//! down, and decides whether that set of keys is a *trigger* for one of the
//! configured macros.  If it is, the macro's action runs (type other keys,
//! run a script of key presses, launch a command, or swallow the event);
//! otherwise the event is forwarded to a virtual output device unchanged.
//!
//! Macros are organised in *layers*.  Each layer has its own switch trigger;
//! holding that trigger makes the layer active, so the same physical keys can
//! mean different things depending on the active layer.
//!
//! This crate defines:
//!
//! - **`domain`** – Pure data and logic: input events, triggers and the
//!   first-match rule, the `Action` sum type, and the layered `MacroTable`
//!   with its default-macro merge.
//!
//! - **`keymap`** – Key name resolution.  Config files may name keys with
//!   their own aliases or with the Linux `input-event-codes.h` names.
//!
//! - **`config`** – The JSON file schema and the validation step that turns
//!   it into an immutable [`Config`] snapshot.

pub mod config;
pub mod domain;
pub mod keymap;

pub use config::{Config, ConfigError, EffectiveFlags, FlagOverrides, RawConfig};
pub use domain::action::{Action, ButtonMap, ComboStep, CommandSpec};
pub use domain::event::InputEvent;
pub use domain::macro_table::{merge_defaults, Layer, Macro, MacroTable};
pub use domain::trigger::{first_match, HeldKeys, KeyId, Trigger, Triggered};
pub use keymap::KeyResolver;
