// ── Filter predicates for device snapshots ──
//
// Used by list views to narrow a snapshot without re-querying.

use crate::model::{Device, SensorKind};

/// Filter predicate for device collections.
pub enum DeviceFilter {
    All,
    Connected,
    Disconnected,
    ByKind(SensorKind),
    Removable,
    Custom(Box<dyn Fn(&Device) -> bool + Send + Sync>),
}

impl DeviceFilter {
    pub fn matches(&self, device: &Device) -> bool {
        match self {
            Self::All => true,
            Self::Connected => device.effective_connected(),
            Self::Disconnected => !device.effective_connected(),
            Self::ByKind(kind) => device.sensor_type == *kind,
            Self::Removable => device.removable,
            Self::Custom(f) => f(device),
        }
    }
}
