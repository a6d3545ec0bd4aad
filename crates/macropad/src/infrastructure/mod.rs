//! Infrastructure layer for the daemon.
//!
//! Contains OS-facing adapters: evdev/uinput devices, process spawning,
//! clocks, config file loading, and log initialisation.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `macropad_core`, but MUST NOT be imported by the `application` or domain
//! layers (the application's `#[cfg(test)]` modules excepted).
//!
//! # Sub-modules
//!
//! - **`input_device`** – evdev implementations of `DeviceConnector`,
//!   `InputSource`, and `VirtualOutput` (Linux only), plus scripted mocks.
//!
//! - **`process`** – Spawns macro and layer-entry commands in their own
//!   process group after `~` and `$VAR` expansion.
//!
//! - **`clock`** – `SystemClock` for production and a `ManualClock` that
//!   tests advance by hand.
//!
//! - **`journal`** – One ordered record of side effects shared by the mocks,
//!   so tests can assert how outputs, sleeps, and spawns interleave.
//!
//! - **`storage`** – Locates and loads the JSON config file.
//!
//! - **`logging`** – Console plus rolling file log setup.

pub mod clock;
pub mod input_device;
pub mod journal;
pub mod logging;
pub mod process;
pub mod storage;
