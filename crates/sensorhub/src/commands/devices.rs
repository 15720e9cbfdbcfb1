//! Device command handlers.

use std::sync::Arc;

use serde::Serialize;
use tabled::Tabled;

use sensorhub_core::{
    Device, DeviceConfig, DeviceFilter, Monitor, NewDevice, NodeId, SensorKind,
};

use crate::cli::{
    AddDeviceArgs, ConfigureArgs, DeviceFilterArg, DeviceListArgs, DevicesArgs, DevicesCommand,
    GlobalOpts,
};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
pub(crate) struct DeviceRow {
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Updated")]
    updated: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Usage")]
    usage: String,
}

impl DeviceRow {
    pub(crate) fn new(d: &Device, color: bool) -> Self {
        Self {
            node: d.node_id.to_string(),
            name: d.display_name.clone(),
            kind: d.sensor_type.to_string(),
            status: output::status_label(d.effective_connected(), color),
            value: reading(d),
            updated: d
                .timestamp
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default(),
            mode: d.config.emergency_mode_or_default().to_string(),
            usage: d.config.usage_type_or_default().to_string(),
        }
    }
}

#[derive(Tabled)]
struct OverrideRow {
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Data Type")]
    data_type: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Usage")]
    usage: String,
    #[tabled(rename = "Connected")]
    connected: String,
}

/// One stored override, as rendered by `devices overrides`.
#[derive(Serialize)]
struct OverrideEntry {
    node_id: NodeId,
    #[serde(flatten)]
    config: DeviceConfig,
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".into(), |v| v.to_string())
}

impl From<&OverrideEntry> for OverrideRow {
    fn from(e: &OverrideEntry) -> Self {
        Self {
            node: e.node_id.to_string(),
            data_type: opt(e.config.data_type),
            mode: opt(e.config.emergency_mode),
            usage: opt(e.config.usage_type),
            connected: opt(e.config.connected_override),
        }
    }
}

/// Last reading with its unit, e.g. `21.5 °C`.
pub(crate) fn reading(d: &Device) -> String {
    match (&d.value, &d.unit) {
        (Some(v), Some(unit)) if !unit.is_empty() => format!("{v} {unit}"),
        (Some(v), _) => v.to_string(),
        (None, _) => String::new(),
    }
}

fn detail(d: &Arc<Device>) -> String {
    let mut lines = vec![
        format!("Node:      {}", d.node_id),
        format!("Name:      {}", d.display_name),
        format!("Type:      {}", d.sensor_type),
        format!("Status:    {}", d.status_label()),
    ];
    if d.config.connected_override.is_some() {
        lines.push(format!(
            "Reported:  {}",
            if d.connected { "connected" } else { "not connected" }
        ));
    }
    lines.extend([
        format!("Value:     {}", opt(Some(reading(d)).filter(|r| !r.is_empty()))),
        format!(
            "Updated:   {}",
            d.timestamp.map_or_else(|| "-".into(), |t| t.to_rfc3339())
        ),
        format!("Data Type: {}", d.config.data_type_or_default()),
        format!("Mode:      {}", d.config.emergency_mode_or_default()),
        format!("Usage:     {}", d.config.usage_type_or_default()),
        format!("Removable: {}", if d.removable { "yes" } else { "no" }),
    ]);
    lines.join("\n")
}

fn config_detail(node_id: &str, c: &DeviceConfig) -> String {
    [
        format!("Node:      {node_id}"),
        format!("Data Type: {}", c.data_type_or_default()),
        format!("Mode:      {}", c.emergency_mode_or_default()),
        format!("Usage:     {}", c.usage_type_or_default()),
        format!("Connected: {}", opt(c.connected_override)),
    ]
    .join("\n")
}

// ── Filters ─────────────────────────────────────────────────────────

pub(crate) fn to_filter(arg: DeviceFilterArg) -> DeviceFilter {
    match arg {
        DeviceFilterArg::All => DeviceFilter::All,
        DeviceFilterArg::Connected => DeviceFilter::Connected,
        DeviceFilterArg::Disconnected => DeviceFilter::Disconnected,
        DeviceFilterArg::Removable => DeviceFilter::Removable,
    }
}

fn matches_kind(kind: Option<&SensorKind>, d: &Device) -> bool {
    kind.is_none_or(|k| d.sensor_type == *k)
}

// ── Sync ────────────────────────────────────────────────────────────

/// Pull one snapshot and apply stored overrides.
///
/// A rejected session aborts the command. Any other snapshot failure
/// is reported and the command continues on the saved devices.
async fn sync(monitor: &Monitor) -> Result<(), CliError> {
    if let Err(e) = monitor.refresh().await {
        if e.is_unauthorized() {
            return Err(e.into());
        }
        tracing::warn!(error = %e, "hub unreachable, showing saved devices");
    }
    monitor.load_overrides().await?;
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    args: DevicesArgs,
    monitor: &Monitor,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        DevicesCommand::List(list) => list_devices(&list, monitor, global).await,

        DevicesCommand::Get { node_id } => {
            sync(monitor).await?;
            let device = monitor
                .device(&node_id)
                .ok_or(CliError::NotFound { identifier: node_id })?;
            let out = output::render_single(&global.output, &device, detail, |d| {
                d.node_id.to_string()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Add(add) => add_device(add, monitor, global).await,

        DevicesCommand::Remove { node_id } => {
            if !util::confirm(&format!("Remove device {node_id}?"), global.yes)? {
                return Ok(());
            }
            sync(monitor).await?;
            monitor.remove_device(&node_id).await?;
            if !global.quiet {
                eprintln!("Removed {node_id}");
            }
            Ok(())
        }

        DevicesCommand::Configure(configure) => configure_device(configure, monitor, global).await,

        DevicesCommand::Overrides { node_id } => {
            let entries: Vec<OverrideEntry> = monitor
                .overrides()
                .all()
                .await?
                .into_iter()
                .filter(|(id, _)| node_id.as_deref().is_none_or(|want| id.as_str() == want))
                .map(|(node_id, config)| OverrideEntry { node_id, config })
                .collect();
            let out = output::render_list(&global.output, &entries, |e| OverrideRow::from(e), |e| {
                e.node_id.to_string()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

async fn list_devices(
    args: &DeviceListArgs,
    monitor: &Monitor,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    sync(monitor).await?;

    let filter = to_filter(args.filter);
    let kind = args.sensor_type.as_deref().map(SensorKind::from_tag);
    let devices: Vec<Arc<Device>> = monitor
        .snapshot()
        .iter()
        .filter(|d| filter.matches(d) && matches_kind(kind.as_ref(), d))
        .cloned()
        .collect();

    let color = output::should_color(&global.color);
    let out = output::render_list(
        &global.output,
        &devices,
        |d| DeviceRow::new(d, color),
        |d| d.node_id.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

async fn add_device(
    args: AddDeviceArgs,
    monitor: &Monitor,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let node_id = args.node_id.clone();
    let message = monitor
        .register_device(NewDevice {
            node_id: args.node_id,
            location: args.location,
            sensor_type: args.sensor_type,
        })
        .await?;

    if !global.quiet {
        eprintln!(
            "{}",
            message.unwrap_or_else(|| format!("Registered {node_id}"))
        );
    }
    Ok(())
}

async fn configure_device(
    args: ConfigureArgs,
    monitor: &Monitor,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let patch = DeviceConfig {
        data_type: args.data_type,
        emergency_mode: args.emergency_mode,
        usage_type: args.usage_type,
        connected_override: args.connected,
    };
    if patch.is_empty() {
        return Err(CliError::Validation {
            field: "configure".into(),
            reason: "pass at least one of --data-type, --mode, --usage, --connected".into(),
        });
    }

    let merged = monitor.set_config(&args.node_id, patch).await?;
    let node_id = args.node_id;
    let out = output::render_single(
        &global.output,
        &merged,
        |c| config_detail(&node_id, c),
        |_| node_id.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sensorhub_core::{DeviceCatalog, SensorValue};

    fn device() -> Device {
        Device::new(NodeId::parse("sensor_05").unwrap(), &DeviceCatalog::default())
    }

    #[test]
    fn reading_joins_value_and_unit() {
        let mut d = device();
        assert_eq!(reading(&d), "");
        d.value = Some(SensorValue::Number(21.5));
        assert_eq!(reading(&d), "21.5");
        d.unit = Some("°C".into());
        assert_eq!(reading(&d), "21.5 °C");
    }

    #[test]
    fn row_uses_effective_connection_state() {
        let mut d = device();
        d.connected = true;
        d.config.connected_override = Some(false);
        let row = DeviceRow::new(&d, false);
        assert_eq!(row.status, "not connected");
        assert_eq!(row.mode, "Normal");
        assert_eq!(row.usage, "Active");
    }

    #[test]
    fn kind_filter_is_optional() {
        let d = device();
        assert!(matches_kind(None, &d));
        assert!(matches_kind(Some(&d.sensor_type), &d));
        assert!(!matches_kind(Some(&SensorKind::Other("smoke".into())), &d));
    }
}
