//! Command handlers.

pub mod auth;
pub mod config_cmd;
pub mod devices;
pub mod hub;
pub mod util;
pub mod watch;

use std::sync::Arc;

use sensorhub_core::{ChangeBus, FileKv, Monitor, SessionGuard};

use crate::cli::{Command, GlobalOpts};
use crate::config::Resolved;
use crate::error::CliError;

/// Route a hub-facing command to its handler.
pub async fn dispatch(
    cmd: Command,
    resolved: Resolved,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Watch(args) => watch::handle(args, resolved, global).await,
        cmd => {
            let monitor = open_monitor(&resolved)?;
            let result = match cmd {
                Command::Devices(args) => devices::handle(args, &monitor, global).await,
                Command::SensorTypes => hub::sensor_types(&monitor, global).await,
                Command::Notifications(args) => hub::notifications(&args, &monitor, global).await,
                Command::Mode(args) => hub::mode(&args, &monitor, global).await,
                // Handled in main before a hub connection exists
                Command::Watch(_)
                | Command::Login(_)
                | Command::Logout
                | Command::Config(_)
                | Command::Completions(_) => Ok(()),
            };
            monitor.shutdown().await;
            result
        }
    }
}

/// Build a monitor over the profile's override store.
pub fn open_monitor(resolved: &Resolved) -> Result<Monitor, CliError> {
    let kv = FileKv::open(&resolved.overrides_path)?;
    let monitor = Monitor::new(
        resolved.monitor.clone(),
        Arc::new(kv),
        ChangeBus::new(),
        session_guard(resolved),
    )?;
    Ok(monitor)
}

/// On a rejected session, forget the stored token so the next run asks
/// for a fresh one. A token passed on the command line is left alone.
fn session_guard(resolved: &Resolved) -> SessionGuard {
    if resolved.token_from_flag {
        return SessionGuard::noop();
    }
    let profile = resolved.profile_name.clone();
    SessionGuard::new(move || {
        if let Err(e) = sensorhub_config::clear_token(&profile) {
            tracing::warn!(error = %e, profile = %profile, "could not clear stored token");
        }
    })
}
