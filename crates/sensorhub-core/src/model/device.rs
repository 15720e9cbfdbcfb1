// ── Device domain types ──

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::catalog::DeviceCatalog;
use super::config::DeviceConfig;
use super::node_id::NodeId;

// ── SensorKind ──────────────────────────────────────────────────────

/// Sensor category.
///
/// The four built-in kinds have dedicated variants; any other non-empty
/// tag reported by the hub is kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SensorKind {
    Motion,
    Humidity,
    Vibration,
    Temperature,
    Other(String),
    #[default]
    Unknown,
}

impl SensorKind {
    /// Interpret a raw type tag. Blank tags map to `Unknown`.
    pub fn from_tag(tag: &str) -> Self {
        let tag = tag.trim();
        match tag.to_ascii_lowercase().as_str() {
            "" | "unknown" => Self::Unknown,
            "motion" => Self::Motion,
            "humidity" => Self::Humidity,
            "vibration" => Self::Vibration,
            "temperature" => Self::Temperature,
            _ => Self::Other(tag.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Motion => "motion",
            Self::Humidity => "humidity",
            Self::Vibration => "vibration",
            Self::Temperature => "temperature",
            Self::Other(tag) => tag,
            Self::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for SensorKind {
    fn from(s: String) -> Self {
        Self::from_tag(&s)
    }
}

impl From<SensorKind> for String {
    fn from(kind: SensorKind) -> Self {
        kind.as_str().to_owned()
    }
}

// ── SensorValue ─────────────────────────────────────────────────────

/// Last reported measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

// ── RemoteDeviceState ───────────────────────────────────────────────

/// Remote fields for one node, as delivered by a snapshot or push frame.
///
/// `None` means "not in this payload" and leaves the stored field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteDeviceState {
    pub connected: Option<bool>,
    pub sensor_type: Option<String>,
    pub value: Option<SensorValue>,
    pub unit: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

// ── Device ──────────────────────────────────────────────────────────

/// One record of the authoritative device map.
///
/// Remote fields (`connected`, `sensor_type`, `value`, `unit`,
/// `timestamp`) are written only by snapshot/push input; `config` only
/// by local overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub node_id: NodeId,
    pub display_name: String,
    pub sensor_type: SensorKind,
    pub connected: bool,
    pub value: Option<SensorValue>,
    pub unit: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub config: DeviceConfig,
    /// Registered locally or restored from the saved-devices list.
    pub removable: bool,
}

impl Device {
    /// A fresh record with defaults, named and typed from the catalog.
    pub fn new(node_id: NodeId, catalog: &DeviceCatalog) -> Self {
        let (display_name, sensor_type) = match catalog.lookup(&node_id) {
            Some(entry) => (entry.name.clone(), entry.sensor_type.clone()),
            None => (node_id.fallback_name(), SensorKind::Unknown),
        };

        Self {
            node_id,
            display_name,
            sensor_type,
            connected: false,
            value: None,
            unit: None,
            timestamp: None,
            config: DeviceConfig::default(),
            removable: false,
        }
    }

    /// `connected`, with a local override taking precedence for display.
    pub fn effective_connected(&self) -> bool {
        self.config.connected_override.unwrap_or(self.connected)
    }

    /// Status label used by list views.
    pub fn status_label(&self) -> &'static str {
        if self.effective_connected() {
            "connected"
        } else {
            "not connected"
        }
    }
}

// ── SavedDevice ─────────────────────────────────────────────────────

/// Entry of the persisted `savedDevices` fallback list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedDevice {
    pub node_id: NodeId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub sensor_type: Option<String>,
    #[serde(default)]
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<SensorValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn sensor_kind_from_tag() {
        assert_eq!(SensorKind::from_tag("motion"), SensorKind::Motion);
        assert_eq!(SensorKind::from_tag(" Humidity "), SensorKind::Humidity);
        assert_eq!(SensorKind::from_tag(""), SensorKind::Unknown);
        assert_eq!(SensorKind::from_tag("smoke"), SensorKind::Other("smoke".into()));
        assert_eq!(SensorKind::from_tag("smoke").to_string(), "smoke");
    }

    #[test]
    fn new_device_uses_catalog() {
        let catalog = DeviceCatalog::default();
        let d = Device::new(NodeId::parse("sensor_01").unwrap(), &catalog);
        assert_eq!(d.display_name, "Living Room Motion");
        assert_eq!(d.sensor_type, SensorKind::Motion);
        assert!(!d.connected);
        assert!(d.value.is_none());

        let d = Device::new(NodeId::parse("sensor_09").unwrap(), &catalog);
        assert_eq!(d.display_name, "SENSOR 09");
        assert_eq!(d.sensor_type, SensorKind::Unknown);
    }

    #[test]
    fn override_wins_for_display() {
        let mut d = Device::new(NodeId::parse("sensor_02").unwrap(), &DeviceCatalog::default());
        d.connected = true;
        assert_eq!(d.status_label(), "connected");
        d.config.connected_override = Some(false);
        assert_eq!(d.status_label(), "not connected");
    }

    #[test]
    fn sensor_value_untagged() {
        let v: SensorValue = serde_json::from_str("12.5").unwrap();
        assert_eq!(v, SensorValue::Number(12.5));
        let v: SensorValue = serde_json::from_str("\"open\"").unwrap();
        assert_eq!(v.to_string(), "open");
        assert_eq!(SensorValue::Number(5.0).to_string(), "5");
    }

    #[test]
    fn saved_device_tolerates_sparse_entries() {
        let saved: SavedDevice =
            serde_json::from_str(r#"{"node_id": "sensor_12", "isRemovable": true}"#).unwrap();
        assert_eq!(saved.node_id.as_str(), "sensor_12");
        assert!(!saved.connected);
        assert!(saved.name.is_none());
    }
}
