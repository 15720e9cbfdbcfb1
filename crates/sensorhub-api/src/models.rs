// Wire types for the sensor hub REST API and push frames.
//
// Everything here mirrors the JSON the hub sends, field for field.
// Interpretation (timestamps, value typing, id validation) happens in
// sensorhub-core; this module only gets bytes into structs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Remote status fields for one sensor node.
///
/// Every field is optional: a payload that omits a field must leave the
/// corresponding local field untouched, so absence has to survive
/// deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorStatus {
    #[serde(default)]
    pub connected: Option<bool>,

    /// Sensor category tag, e.g. `"motion"`.
    #[serde(default, rename = "type")]
    pub sensor_type: Option<String>,

    /// Last measurement. Numbers, strings and booleans all occur in the wild.
    #[serde(default)]
    pub value: Option<Value>,

    #[serde(default)]
    pub unit: Option<String>,

    /// ISO-8601 observation time.
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Node id → status, in stable key order.
pub type SensorStatusMap = BTreeMap<String, SensorStatus>;

/// Decode a `{node_id: {...}}` object entry by entry.
///
/// Entries that fail to decode are skipped and counted rather than
/// failing the whole map. Returns the decoded map and the number of
/// rejected entries.
pub fn decode_status_map(data: Value) -> Result<(SensorStatusMap, usize), String> {
    let Value::Object(entries) = data else {
        return Err(format!("expected a JSON object, got {}", json_kind(&data)));
    };

    let mut map = SensorStatusMap::new();
    let mut rejected = 0;

    for (node_id, raw) in entries {
        match serde_json::from_value::<SensorStatus>(raw) {
            Ok(status) => {
                map.insert(node_id, status);
            }
            Err(e) => {
                tracing::warn!(node_id, error = %e, "skipping undecodable sensor entry");
                rejected += 1;
            }
        }
    }

    Ok((map, rejected))
}

/// Pick the status mapping out of a snapshot body.
///
/// The hub wraps it as `{"data": {...}}`; a bare mapping is accepted too.
pub(crate) fn unwrap_status_body(body: Value) -> Value {
    match body {
        Value::Object(mut obj) if obj.get("data").is_some_and(Value::is_object) => {
            obj.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Push frames ──────────────────────────────────────────────────────

/// Raw frame the push channel sends: `{"status": "success", "data": {...}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct PushFrame {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

// ── Requests ─────────────────────────────────────────────────────────

/// Body of the outbound device-state push (`POST sensor/`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorStateRequest {
    pub sensor_id: String,
    pub state: bool,
}

/// Body of the device registration call (`POST devices/`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRegistration {
    pub node_id: String,
    pub client_id: String,
    pub location: String,
    pub sensor_type: String,
}

/// Body of the arm-mode change (`POST mode/`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeRequest {
    pub mode: String,
}

// ── Responses ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// `GET mode/` answers with prose, e.g. `"System is in away mode"`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModeResponse {
    #[serde(default)]
    pub message: Option<String>,
}

impl ModeResponse {
    /// The mode word: second to last word of the message.
    pub fn mode_word(&self) -> Option<&str> {
        let mut words = self.message.as_deref()?.split_whitespace().rev();
        words.next()?;
        words.next()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct SensorTypesResponse {
    #[serde(default)]
    pub sensor_types: Vec<String>,
}

/// A notification from `GET notifications/`.
///
/// Uses `#[serde(flatten)]` to keep every field beyond the core set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub id: Option<Value>,

    /// Notification category, e.g. `"motion"`, `"smoke"`, `"door"`.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub timestamp: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Error body shapes the hub uses: `{"error": ...}` or `{"detail": ...}`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ErrorBody {
    pub(crate) fn into_message(self) -> Option<String> {
        self.error.or(self.detail)
    }
}
