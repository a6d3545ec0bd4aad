//! JSON config file location and loading.
//!
//! The default file lives at:
//! - `$XDG_CONFIG_HOME/uinput-macropad/config.json`, or
//! - `~/.config/uinput-macropad/config.json` when `XDG_CONFIG_HOME` is unset.
//!
//! Unlike a settings file that can fall back to defaults, a macro pad without
//! a config has nothing to do, so a missing file is an error here.
//!
//! # Exit codes
//!
//! | Error                | Code |
//! |----------------------|------|
//! | `NoConfigDir`        | 1    |
//! | `ConfigMissing`      | 1    |
//! | `ConfigUnreadable`   | 2    |
//! | `ConfigInvalid`      | 2    |
//! | `NoDevice`           | 2    |
//!
//! A config without `dev_name` is a config error (2), not an unresolved
//! device: nothing names a device to look for.  A descriptor that names a
//! device which cannot be opened exits with 1 from the supervisor instead.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use macropad_core::{Config, ConfigError, FlagOverrides};
use thiserror::Error;
use tracing::debug;

/// Directory name under the XDG base directories.
pub const APP_DIR: &str = "uinput-macropad";

/// File name of the default config.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Error type for everything that stops the daemon before a device is opened.
#[derive(Debug, Error)]
pub enum StartupError {
    /// No usable config path: neither `XDG_CONFIG_HOME` nor a home directory.
    #[error("could not determine the config directory; pass --config-file")]
    NoConfigDir,

    /// The config file does not exist.
    #[error("Config file not found: {}", path.display())]
    ConfigMissing { path: PathBuf },

    /// The config file exists but could not be read.
    #[error("Cannot read config file {}: {source}", path.display())]
    ConfigUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON or a declaration is malformed.
    #[error("Cannot load config file {}: {source}", path.display())]
    ConfigInvalid {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },

    /// The config does not name a device.
    #[error("Config file {} does not set \"dev_name\"", path.display())]
    NoDevice { path: PathBuf },
}

impl StartupError {
    /// The process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            StartupError::NoConfigDir | StartupError::ConfigMissing { .. } => 1,
            StartupError::ConfigUnreadable { .. }
            | StartupError::ConfigInvalid { .. }
            | StartupError::NoDevice { .. } => 2,
        }
    }
}

/// A loaded config together with where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub path: PathBuf,
    /// The `dev_name` descriptor, guaranteed present.
    pub descriptor: String,
    pub config: Config,
}

// ── Path resolution ───────────────────────────────────────────────────────────

/// Resolves the default config file path from the environment.
///
/// # Errors
///
/// Returns [`StartupError::NoConfigDir`] when neither `XDG_CONFIG_HOME` nor
/// the home directory is known.
pub fn default_config_path() -> Result<PathBuf, StartupError> {
    config_path_from(std::env::var_os("XDG_CONFIG_HOME"), dirs::home_dir())
        .ok_or(StartupError::NoConfigDir)
}

fn config_path_from(xdg_config_home: Option<OsString>, home: Option<PathBuf>) -> Option<PathBuf> {
    let base = xdg_config_home
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| home.map(|h| h.join(".config")))?;
    Some(base.join(APP_DIR).join(CONFIG_FILE_NAME))
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Reads, parses, and validates the config at `path`, applying `cli` flag
/// overrides on top of the file's own flags.
///
/// # Errors
///
/// See the module-level table; each variant maps to one exit code.
pub fn load_config_file(path: &Path, cli: &FlagOverrides) -> Result<LoadedConfig, StartupError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StartupError::ConfigMissing {
                path: path.to_path_buf(),
            })
        }
        Err(source) => {
            return Err(StartupError::ConfigUnreadable {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let config = Config::from_json_str(&text, cli).map_err(|source| StartupError::ConfigInvalid {
        path: path.to_path_buf(),
        source,
    })?;
    let descriptor = config
        .device
        .clone()
        .filter(|d| !d.is_empty())
        .ok_or_else(|| StartupError::NoDevice {
            path: path.to_path_buf(),
        })?;

    debug!(
        "loaded {} with {} layers",
        path.display(),
        config.table.layers().len()
    );
    Ok(LoadedConfig {
        path: path.to_path_buf(),
        descriptor,
        config,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
