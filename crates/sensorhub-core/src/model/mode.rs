// ── System arm mode ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Whether the hub raises alarms, and for which sensors.
///
/// The wire form is the lowercase name (`{"mode": "away"}`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
    EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum ArmMode {
    #[default]
    #[strum(to_string = "Disarm", serialize = "disarm")]
    Disarm,
    #[strum(to_string = "Stay", serialize = "stay")]
    Stay,
    #[strum(to_string = "Away", serialize = "away")]
    Away,
}

impl ArmMode {
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Disarm => "disarm",
            Self::Stay => "stay",
            Self::Away => "away",
        }
    }
}
