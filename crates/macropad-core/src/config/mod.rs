//! JSON configuration schema and the immutable [`Config`] snapshot.
//!
//! # File layout (for beginners)
//!
//! ```json
//! {
//!   "dev_name": "My Keypad",
//!   "full_grab": true,
//!   "only_defined": false,
//!   "clone": true,
//!   "mapping": { "G1": 183, "G2": 184 },
//!   "layers": [
//!     ["base",  ["G1"]],
//!     ["media", ["G2"], ["notify-send", "media layer"]]
//!   ],
//!   "macros": {
//!     "__default__": [ ["no-esc", [1], "dispose"] ],
//!     "base":  [ ["copy", ["KEY_LEFTCTRL", "KEY_C"], "key", [46]] ],
//!     "media": [ ["play", [30], "key", ["KEY_PLAYPAUSE"]] ]
//!   }
//! }
//! ```
//!
//! The list-shaped declarations are positional, so they are read as raw
//! `serde_json::Value`s and validated by [`build_macro_table`] into typed
//! domain values.  Any malformed declaration is a hard error: the daemon
//! refuses to start rather than silently ignoring a macro.
//!
//! # Flag resolution
//!
//! `full_grab`, `only_defined` and `clone` are resolved in three tiers:
//! built-in default, then the config file, then the command line.  A tier
//! only overrides the previous one when it sets the flag explicitly.

mod build;

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::macro_table::MacroTable;
use crate::keymap::KeyResolver;

pub use build::{build_macro_table, DEFAULT_LAYER_KEY};

/// Error type for configuration parsing and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file content is not valid JSON or does not match the schema.
    #[error("failed to parse config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// The `layers` list is absent or empty.
    #[error("config declares no layers")]
    NoLayers,

    /// A `layers` entry is malformed.
    #[error("layer entry #{index}: {reason}")]
    MalformedLayer { index: usize, reason: String },

    /// Two `layers` entries share a name.
    #[error("layer {0:?} is declared more than once")]
    DuplicateLayer(String),

    /// `macros` has a key that is neither a declared layer nor `__default__`.
    #[error("macros declared for undeclared layer {0:?}")]
    UnknownLayer(String),

    /// A `macros` entry is malformed.
    #[error("layer {layer:?}, macro #{index}: {reason}")]
    MalformedMacro {
        layer: String,
        index: usize,
        reason: String,
    },
}

/// The config file as written on disk.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfig {
    /// Device descriptor: event index, device path, or exact device name.
    #[serde(default)]
    pub dev_name: Option<String>,
    #[serde(default)]
    pub full_grab: Option<bool>,
    #[serde(default)]
    pub only_defined: Option<bool>,
    #[serde(default)]
    pub clone: Option<bool>,
    /// Key alias name → numeric code.
    #[serde(default)]
    pub mapping: BTreeMap<String, u16>,
    /// `[name, switchKeys, optionalCommand]` entries.
    #[serde(default)]
    pub layers: Vec<serde_json::Value>,
    /// Layer name (or `__default__`) → `[name, keys, type, payload]` entries.
    #[serde(default)]
    pub macros: BTreeMap<String, Vec<serde_json::Value>>,
}

impl RawConfig {
    /// Parses the JSON text of a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not valid JSON or a
    /// top-level field has the wrong type.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// The flag values the file sets explicitly.
    pub fn flag_overrides(&self) -> FlagOverrides {
        FlagOverrides {
            full_grab: self.full_grab,
            only_defined: self.only_defined,
            clone: self.clone,
        }
    }
}

/// Explicitly set flag values from one tier (config file or command line).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagOverrides {
    pub full_grab: Option<bool>,
    pub only_defined: Option<bool>,
    pub clone: Option<bool>,
}

/// The resolved behaviour flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveFlags {
    /// Grab the device exclusively.
    pub full_grab: bool,
    /// Drop unmatched events instead of forwarding them.
    pub only_defined: bool,
    /// Clone the source device's capabilities onto the virtual device.
    pub clone_capabilities: bool,
}

impl Default for EffectiveFlags {
    fn default() -> Self {
        Self {
            full_grab: true,
            only_defined: false,
            clone_capabilities: true,
        }
    }
}

impl EffectiveFlags {
    /// Applies `file` over the defaults, then `cli` over the result.
    pub fn resolve(file: &FlagOverrides, cli: &FlagOverrides) -> Self {
        let defaults = Self::default();
        Self {
            full_grab: cli
                .full_grab
                .or(file.full_grab)
                .unwrap_or(defaults.full_grab),
            only_defined: cli
                .only_defined
                .or(file.only_defined)
                .unwrap_or(defaults.only_defined),
            clone_capabilities: cli
                .clone
                .or(file.clone)
                .unwrap_or(defaults.clone_capabilities),
        }
    }
}

/// The immutable runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Device descriptor from `dev_name`.
    pub device: Option<String>,
    pub flags: EffectiveFlags,
    pub keys: KeyResolver,
    pub table: MacroTable,
}

impl Config {
    /// Validates `raw` and resolves the flags against `cli`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first malformed declaration.
    pub fn from_raw(raw: RawConfig, cli: &FlagOverrides) -> Result<Self, ConfigError> {
        let flags = EffectiveFlags::resolve(&raw.flag_overrides(), cli);
        let keys = KeyResolver::new(raw.mapping.clone());
        let table = build_macro_table(&raw, &keys)?;
        Ok(Self {
            device: raw.dev_name,
            flags,
            keys,
            table,
        })
    }

    /// Parses and validates JSON text in one step.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid JSON, or a validation error.
    pub fn from_json_str(text: &str, cli: &FlagOverrides) -> Result<Self, ConfigError> {
        Self::from_raw(RawConfig::from_json_str(text)?, cli)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
