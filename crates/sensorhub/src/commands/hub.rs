//! Hub-wide endpoints: sensor types, notifications and the arm mode.

use serde::Serialize;
use tabled::Tabled;

use sensorhub_core::{ArmMode, Monitor, Notification};

use crate::cli::{GlobalOpts, ModeArgs, NotificationsArgs};
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct SensorType {
    name: String,
}

#[derive(Tabled)]
struct SensorTypeRow {
    #[tabled(rename = "Sensor Type")]
    name: String,
}

#[derive(Tabled)]
struct NotificationRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Time")]
    timestamp: String,
}

impl From<&Notification> for NotificationRow {
    fn from(n: &Notification) -> Self {
        Self {
            id: notification_id(n),
            kind: n.kind.clone().unwrap_or_default(),
            message: n.message.clone().unwrap_or_default(),
            timestamp: n.timestamp.clone().unwrap_or_default(),
        }
    }
}

/// Ids come back as numbers or strings; show either without quotes.
fn notification_id(n: &Notification) -> String {
    match &n.id {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

pub async fn sensor_types(monitor: &Monitor, global: &GlobalOpts) -> Result<(), CliError> {
    let types: Vec<SensorType> = monitor
        .sensor_types()
        .await?
        .into_iter()
        .map(|name| SensorType { name })
        .collect();

    let out = output::render_list(
        &global.output,
        &types,
        |t| SensorTypeRow {
            name: t.name.clone(),
        },
        |t| t.name.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn notifications(
    args: &NotificationsArgs,
    monitor: &Monitor,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut items = monitor.notifications().await?;
    if let Some(limit) = args.limit {
        items.truncate(limit);
    }

    let out = output::render_list(
        &global.output,
        &items,
        |n| NotificationRow::from(n),
        notification_id,
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

#[derive(Serialize)]
struct ModeView {
    mode: ArmMode,
}

pub async fn mode(
    args: &ModeArgs,
    monitor: &Monitor,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mode = match args.mode {
        Some(mode) => {
            monitor.set_arm_mode(mode).await?;
            if !global.quiet {
                eprintln!("Arm mode set to {mode}");
            }
            mode
        }
        None => monitor.arm_mode().await?,
    };

    let view = ModeView { mode };
    let out = output::render_single(
        &global.output,
        &view,
        |v| format!("Mode: {}", v.mode),
        |v| v.mode.wire_name().to_owned(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
