// ── Locally owned device configuration ──
//
// Serialized field names and enum strings match the persisted override
// records: `{"connected": .., "dataType": "Time Delay", ..}`.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// How quickly a triggered sensor raises an alarm.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
    EnumIter, IntoStaticStr,
)]
pub enum DataType {
    #[default]
    #[serde(rename = "Time Delay")]
    #[strum(to_string = "Time Delay", serialize = "time-delay")]
    TimeDelay,
    #[strum(to_string = "Instant", serialize = "instant")]
    Instant,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
    EnumIter, IntoStaticStr,
)]
pub enum EmergencyMode {
    #[strum(to_string = "Emergency", serialize = "emergency")]
    Emergency,
    #[default]
    #[strum(to_string = "Normal", serialize = "normal")]
    Normal,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
    EnumIter, IntoStaticStr,
)]
pub enum UsageType {
    #[default]
    #[strum(to_string = "Active", serialize = "active")]
    Active,
    #[strum(to_string = "Bypass", serialize = "bypass")]
    Bypass,
}

/// Per-device configuration. Every field is optional: the same type
/// serves as a stored record and as a partial update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_mode: Option<EmergencyMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_type: Option<UsageType>,

    /// User-forced connection state, pushed upstream on write.
    #[serde(default, rename = "connected", skip_serializing_if = "Option::is_none")]
    pub connected_override: Option<bool>,
}

impl DeviceConfig {
    /// Shallow merge: fields set in `patch` overwrite, others stay.
    /// Returns `true` if anything changed.
    pub fn merge(&mut self, patch: &DeviceConfig) -> bool {
        let before = self.clone();
        if patch.data_type.is_some() {
            self.data_type = patch.data_type;
        }
        if patch.emergency_mode.is_some() {
            self.emergency_mode = patch.emergency_mode;
        }
        if patch.usage_type.is_some() {
            self.usage_type = patch.usage_type;
        }
        if patch.connected_override.is_some() {
            self.connected_override = patch.connected_override;
        }
        *self != before
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn data_type_or_default(&self) -> DataType {
        self.data_type.unwrap_or_default()
    }

    pub fn emergency_mode_or_default(&self) -> EmergencyMode {
        self.emergency_mode.unwrap_or_default()
    }

    pub fn usage_type_or_default(&self) -> UsageType {
        self.usage_type.unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_names() {
        let cfg = DeviceConfig {
            data_type: Some(DataType::TimeDelay),
            emergency_mode: Some(EmergencyMode::Emergency),
            usage_type: Some(UsageType::Bypass),
            connected_override: Some(false),
        };
        assert_eq!(
            serde_json::to_value(&cfg).unwrap(),
            json!({
                "dataType": "Time Delay",
                "emergencyMode": "Emergency",
                "usageType": "Bypass",
                "connected": false
            })
        );
    }

    #[test]
    fn partial_record_decodes() {
        let cfg: DeviceConfig = serde_json::from_value(json!({ "dataType": "Instant" })).unwrap();
        assert_eq!(cfg.data_type, Some(DataType::Instant));
        assert!(cfg.emergency_mode.is_none());
        assert_eq!(cfg.emergency_mode_or_default(), EmergencyMode::Normal);
        assert_eq!(cfg.usage_type_or_default(), UsageType::Active);
    }

    #[test]
    fn merge_is_shallow() {
        let mut cfg = DeviceConfig {
            data_type: Some(DataType::Instant),
            ..DeviceConfig::default()
        };
        let patch = DeviceConfig {
            emergency_mode: Some(EmergencyMode::Emergency),
            ..DeviceConfig::default()
        };

        assert!(cfg.merge(&patch));
        assert_eq!(cfg.data_type, Some(DataType::Instant));
        assert_eq!(cfg.emergency_mode, Some(EmergencyMode::Emergency));
        assert!(!cfg.merge(&patch));
    }

    #[test]
    fn strum_parses_cli_forms() {
        assert_eq!("time-delay".parse::<DataType>().unwrap(), DataType::TimeDelay);
        assert_eq!("Bypass".parse::<UsageType>().unwrap(), UsageType::Bypass);
        assert_eq!(DataType::TimeDelay.to_string(), "Time Delay");
    }
}
