//! Console and rolling file log setup.
//!
//! Both outputs share one level: `warn` by default, `debug` with
//! `--verbose`.  `RUST_LOG` overrides either when set, for example
//! `RUST_LOG=macropad::application=trace`.
//!
//! The file log rotates daily under
//! `$XDG_STATE_HOME/uinput-macropad/` (or `~/.local/state/uinput-macropad/`)
//! and keeps at most [`MAX_LOG_FILES`] files.  It is best-effort: when the
//! directory cannot be created, a warning goes to stderr and only the
//! console log is installed.

use std::ffi::OsString;
use std::path::PathBuf;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::infrastructure::storage::config::APP_DIR;

/// Rotated log files kept on disk.
pub const MAX_LOG_FILES: usize = 3;

const LOG_FILE_PREFIX: &str = "uinput-macropad";
const LOG_FILE_SUFFIX: &str = "log";

/// Default filter directive for the given verbosity.
pub fn default_level(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "warn"
    }
}

fn filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level(verbose)))
}

/// Resolves the log directory from the environment.
pub fn log_dir() -> Option<PathBuf> {
    log_dir_from(std::env::var_os("XDG_STATE_HOME"), dirs::home_dir())
}

fn log_dir_from(xdg_state_home: Option<OsString>, home: Option<PathBuf>) -> Option<PathBuf> {
    let base = xdg_state_home
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| home.map(|h| h.join(".local").join("state")))?;
    Some(base.join(APP_DIR))
}

fn file_appender() -> Result<RollingFileAppender, String> {
    let dir = log_dir().ok_or_else(|| "no state or home directory".to_string())?;
    std::fs::create_dir_all(&dir).map_err(|e| format!("{}: {e}", dir.display()))?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(MAX_LOG_FILES)
        .build(&dir)
        .map_err(|e| format!("{}: {e}", dir.display()))
}

/// Installs the global subscriber.  Call once, before anything logs.
pub fn init(verbose: bool) {
    let console_layer = fmt::layer().with_target(false).with_filter(filter(verbose));

    let file_layer = match file_appender() {
        Ok(appender) => Some(
            fmt::layer()
                .with_writer(appender)
                .with_ansi(false)
                .with_target(true)
                .with_filter(filter(verbose)),
        ),
        Err(e) => {
            eprintln!("Warning: Could not initialize file logging: {e}");
            None
        }
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();
}
