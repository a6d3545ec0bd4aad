//! `uinput-macropad` daemon entry point.
//!
//! # What happens at startup
//!
//! 1. CLI arguments are parsed with `clap` into a [`Cli`] struct.
//! 2. Logging is initialised (`warn`, or `debug` with `--verbose`).
//! 3. The JSON config is loaded and validated.  A missing file exits with
//!    code 1, an unreadable or malformed one with code 2.
//! 4. SIGINT, SIGTERM, and SIGABRT handlers are spawned; each clears a shared
//!    `AtomicBool`.
//! 5. The [`DeviceSupervisor`] runs on a blocking thread until the flag is
//!    cleared.  If the device cannot be opened the first time, the process
//!    exits with code 1.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use macropad::application::dispatch_event::MacroEngine;
use macropad::application::supervise_device::{DeviceConnector, DeviceSupervisor};
use macropad::infrastructure::clock::SystemClock;
use macropad::infrastructure::logging;
use macropad::infrastructure::process::DetachedCommandRunner;
use macropad::infrastructure::storage::config::{default_config_path, load_config_file};
use macropad_core::FlagOverrides;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Turns an input device into a layered macro pad.
///
/// Each paired flag (`--full-grab`/`--no-full-grab`, ...) overrides the
/// config file's value; when neither is given the file decides.  The last
/// one on the command line wins.
#[derive(Debug, Parser)]
#[command(
    name = "uinput-macropad",
    about = "Remap an input device through a virtual uinput device",
    version
)]
struct Cli {
    /// Config file to use instead of the default location.
    #[arg(short = 'c', long = "config-file", value_name = "PATH")]
    config_file: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,

    /// Grab the device exclusively, so unmatched events only arrive through
    /// the virtual device.
    #[arg(long, overrides_with = "no_full_grab")]
    full_grab: bool,
    #[arg(long, overrides_with = "full_grab", hide = true)]
    no_full_grab: bool,

    /// Drop events that match no macro instead of forwarding them.
    #[arg(long, overrides_with = "no_only_defined")]
    only_defined: bool,
    #[arg(long, overrides_with = "only_defined", hide = true)]
    no_only_defined: bool,

    /// Copy the device's capabilities onto the virtual device.
    #[arg(long, overrides_with = "no_clone")]
    clone: bool,
    #[arg(long, overrides_with = "clone", hide = true)]
    no_clone: bool,
}

impl Cli {
    /// The flag values set explicitly on the command line.
    fn flag_overrides(&self) -> FlagOverrides {
        FlagOverrides {
            full_grab: tri_state(self.full_grab, self.no_full_grab),
            only_defined: tri_state(self.only_defined, self.no_only_defined),
            clone: tri_state(self.clone, self.no_clone),
        }
    }
}

fn tri_state(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

// ── Platform wiring ───────────────────────────────────────────────────────────

#[cfg(target_os = "linux")]
fn device_connector() -> anyhow::Result<Box<dyn DeviceConnector>> {
    use macropad::infrastructure::input_device::linux::EvdevConnector;
    Ok(Box::new(EvdevConnector::new()))
}

#[cfg(not(target_os = "linux"))]
fn device_connector() -> anyhow::Result<Box<dyn DeviceConnector>> {
    anyhow::bail!("uinput-macropad needs Linux evdev and uinput")
}

#[cfg(unix)]
fn install_signal_handlers(running: &Arc<AtomicBool>) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let signals = [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
        (SignalKind::from_raw(libc::SIGABRT), "SIGABRT"),
    ];
    for (kind, name) in signals {
        let mut stream =
            signal(kind).with_context(|| format!("failed to install {name} handler"))?;
        let running = Arc::clone(running);
        tokio::spawn(async move {
            if stream.recv().await.is_some() {
                info!("{name} received, shutting down");
                running.store(false, Ordering::Relaxed);
            }
        });
    }
    Ok(())
}

#[cfg(not(unix))]
fn install_signal_handlers(running: &Arc<AtomicBool>) -> anyhow::Result<()> {
    let running = Arc::clone(running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            running.store(false, Ordering::Relaxed);
        }
    });
    Ok(())
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    // ── Configuration ─────────────────────────────────────────────────────────
    let loaded = match cli
        .config_file
        .clone()
        .map_or_else(default_config_path, Ok)
        .and_then(|path| load_config_file(&path, &cli.flag_overrides()))
    {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            std::process::exit(e.exit_code());
        }
    };
    let flags = loaded.config.flags;
    info!(
        "config {} for device {:?}: full_grab={} only_defined={} clone={}",
        loaded.path.display(),
        loaded.descriptor,
        flags.full_grab,
        flags.only_defined,
        flags.clone_capabilities
    );

    // ── Shutdown flag ─────────────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    install_signal_handlers(&running)?;

    // ── Engine and supervisor ─────────────────────────────────────────────────
    let engine = MacroEngine::new(
        loaded.config.table,
        flags.only_defined,
        Arc::new(DetachedCommandRunner),
        Arc::new(SystemClock),
    );
    let mut supervisor = DeviceSupervisor::new(
        device_connector()?,
        engine,
        loaded.descriptor,
        flags,
        Arc::clone(&running),
    );

    // The poll loop blocks, so it gets its own thread and the runtime keeps
    // serving the signal tasks.
    let outcome = tokio::task::spawn_blocking(move || supervisor.run())
        .await
        .context("device loop panicked")?;

    match outcome {
        Ok(_) => {
            println!("\nProgram interrupted");
            info!("uinput-macropad stopped");
            Ok(())
        }
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
