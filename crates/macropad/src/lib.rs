//! macropad library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the daemon do? (for beginners)
//!
//! `uinput-macropad` sits between one physical input device and the rest of
//! the system:
//!
//! ```text
//!  keypad ──evdev──▶ DeviceSupervisor ──▶ MacroEngine ──uinput──▶ "Macropad Output"
//!                      (poll, reconnect)   (layers, macros,          (what the desktop
//!                                           passthrough)              actually sees)
//! ```
//!
//! 1. The supervisor opens (and normally grabs) the configured device and
//!    creates a virtual output device next to it.
//! 2. Every event read from the device is handed to the engine together with
//!    the set of keys the device currently reports as held.
//! 3. The engine switches layers, runs macros (synthesised keys or external
//!    commands) or forwards the event unchanged.
//! 4. When the device is unplugged, the supervisor waits and grabs it again
//!    as soon as it reappears, keeping the active layer.

/// Application layer: the dispatch engine and the device supervisor.
pub mod application;

/// Infrastructure layer: evdev/uinput adapters, process spawning, clocks,
/// config file loading, and logging.
pub mod infrastructure;
