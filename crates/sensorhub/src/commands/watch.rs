//! `watch`: follow live device changes until interrupted.
//!
//! Changes arrive on the monitor's bus and are forwarded into a channel
//! so printing never runs inside a bus listener.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use sensorhub_core::{ChangeSet, Device, DeviceFilter, NodeId, SyncStatus};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::config::Resolved;
use crate::error::CliError;
use crate::output;

use super::devices::{reading, to_filter};

/// One published change set, as emitted in structured output modes.
#[derive(Serialize)]
struct ChangeEvent<'a> {
    at: DateTime<Utc>,
    changed: Vec<&'a Device>,
    removed: &'a [NodeId],
}

pub async fn handle(
    args: WatchArgs,
    mut resolved: Resolved,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if let Some(secs) = args.interval {
        resolved.monitor.poll_interval_secs = secs;
    }
    if args.no_push {
        resolved.monitor.ws_url = None;
    }

    let monitor = super::open_monitor(&resolved)?;

    // Subscribe before focusing so the first snapshot is not missed
    let (tx, mut rx) = mpsc::unbounded_channel::<ChangeSet>();
    let subscription = monitor.bus().subscribe(move |changes: &ChangeSet| {
        let _ = tx.send(changes.clone());
    });
    let mut status = monitor.sync_status();

    let session = match monitor.focus().await {
        Ok(session) => session,
        Err(e) => {
            monitor.shutdown().await;
            return Err(e.into());
        }
    };
    if let Err(e) = monitor.load_overrides().await {
        tracing::warn!(error = %e, "could not apply stored device settings");
    }

    let filter = to_filter(args.filter);
    let color = output::should_color(&global.color);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let result = loop {
        tokio::select! {
            _ = &mut ctrl_c => break Ok(()),

            Some(changes) = rx.recv() => {
                match render_changes(&changes, &filter, &global.output, color) {
                    Ok(text) => output::print_output(&text, global.quiet),
                    Err(e) => break Err(e),
                }
            }

            changed = status.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let current = status.borrow_and_update().clone();
                match current {
                    SyncStatus::SignedOut => {
                        break Err(CliError::AuthFailed {
                            profile: resolved.profile_name.clone(),
                        });
                    }
                    SyncStatus::Degraded { reason } if !global.quiet => {
                        eprintln!("hub unreachable: {reason}");
                    }
                    other => tracing::debug!(status = ?other, "sync status"),
                }
            }
        }
    };

    subscription.unsubscribe();
    session.end().await;
    monitor.shutdown().await;
    result
}

/// Render one change set: a line per device for table/plain output, one
/// document per change set for structured output.
fn render_changes(
    changes: &ChangeSet,
    filter: &DeviceFilter,
    format: &OutputFormat,
    color: bool,
) -> Result<String, CliError> {
    let changed: Vec<&Device> = changes
        .changed
        .iter()
        .map(Arc::as_ref)
        .filter(|d| filter.matches(d))
        .collect();
    if changed.is_empty() && changes.removed.is_empty() {
        return Ok(String::new());
    }

    let event = ChangeEvent {
        at: Utc::now(),
        changed,
        removed: &changes.removed,
    };
    Ok(match format {
        OutputFormat::Json | OutputFormat::JsonCompact => serde_json::to_string(&event)?,
        OutputFormat::Yaml => format!("---\n{}", serde_yaml::to_string(&event)?),
        OutputFormat::Table | OutputFormat::Plain => {
            let at = event.at.format("%H:%M:%S");
            event
                .changed
                .iter()
                .map(|d| format!("{at}  {}", device_line(d, color)))
                .chain(event.removed.iter().map(|id| format!("{at}  {id}  removed")))
                .collect::<Vec<_>>()
                .join("\n")
        }
    })
}

fn device_line(d: &Device, color: bool) -> String {
    let mut line = format!(
        "{}  {}  {}",
        d.node_id,
        d.display_name,
        output::status_label(d.effective_connected(), color)
    );
    let value = reading(d);
    if !value.is_empty() {
        line.push_str("  ");
        line.push_str(&value);
    }
    line
}
