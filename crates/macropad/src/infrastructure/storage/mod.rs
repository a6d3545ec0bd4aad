//! Storage infrastructure: locating and loading the JSON config file.
//!
//! The `config` sub-module resolves the default path, reads the file, and
//! turns every way that can fail into a [`config::StartupError`] carrying the
//! process exit code.

pub mod config;
