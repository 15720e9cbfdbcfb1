// ── API-to-domain type conversions ──
//
// Bridges raw `sensorhub_api` wire types into `sensorhub_core::model`
// types. Values are typed, timestamps parsed; anything unparseable is
// treated as absent so it never clobbers stored data.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use sensorhub_api::{SensorStatus, SensorStatusMap};

use crate::model::{
    Device, DeviceCatalog, NodeId, RemoteBatch, RemoteDeviceState, SavedDevice, SensorKind,
    SensorValue,
};

// ── Helpers ────────────────────────────────────────────────────────

/// Parse an observation time. Accepts RFC 3339 and naive ISO-8601
/// (taken as UTC).
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Type a raw JSON measurement. `null` is absent; composite values are
/// kept as their JSON text.
pub(crate) fn sensor_value(raw: Value) -> Option<SensorValue> {
    match raw {
        Value::Null => None,
        Value::Bool(b) => Some(SensorValue::Bool(b)),
        Value::Number(n) => n.as_f64().map(SensorValue::Number),
        Value::String(s) => Some(SensorValue::Text(s)),
        other @ (Value::Array(_) | Value::Object(_)) => Some(SensorValue::Text(other.to_string())),
    }
}

// ── Remote state ───────────────────────────────────────────────────

impl From<SensorStatus> for RemoteDeviceState {
    fn from(s: SensorStatus) -> Self {
        let timestamp = s.timestamp.as_deref().and_then(|raw| {
            let parsed = parse_timestamp(raw);
            if parsed.is_none() {
                tracing::debug!(raw, "ignoring unparseable timestamp");
            }
            parsed
        });

        Self {
            connected: s.connected,
            sensor_type: s.sensor_type.filter(|t| !t.trim().is_empty()),
            value: s.value.and_then(sensor_value),
            unit: s.unit,
            timestamp,
        }
    }
}

/// Convert a decoded status map into a reconciler batch.
pub fn remote_batch(map: SensorStatusMap) -> RemoteBatch {
    map.into_iter()
        .map(|(node_id, status)| (node_id, RemoteDeviceState::from(status)))
        .collect()
}

// ── Saved devices ──────────────────────────────────────────────────

impl SavedDevice {
    /// Build a removable record from a saved entry.
    pub fn into_device(self, catalog: &DeviceCatalog) -> Device {
        let mut device = Device::new(self.node_id, catalog);
        if let Some(name) = self.name.filter(|n| !n.trim().is_empty()) {
            device.display_name = name;
        }
        if let Some(tag) = self.sensor_type.as_deref().filter(|t| !t.trim().is_empty()) {
            device.sensor_type = SensorKind::from_tag(tag);
        }
        device.connected = self.connected;
        device.value = self.value;
        device.unit = self.unit;
        device.timestamp = self.timestamp;
        device.removable = true;
        device
    }

    /// A fresh entry for a device registered from this client.
    pub fn registered(
        node_id: NodeId,
        location: impl Into<String>,
        sensor_type: &str,
        catalog: &DeviceCatalog,
    ) -> Self {
        let name = catalog.display_name(&node_id);
        Self {
            node_id,
            name: Some(name),
            sensor_type: Some(sensor_type.to_owned()).filter(|t| !t.trim().is_empty()),
            connected: false,
            value: None,
            unit: None,
            timestamp: None,
            location: Some(location.into()),
        }
    }
}
