// ── Domain model ──
//
// Canonical representation of a sensor node and everything the
// reconciler consumes or produces.

pub mod catalog;
pub mod change;
pub mod config;
pub mod device;
pub mod mode;
pub mod node_id;

// ── Re-exports ──────────────────────────────────────────────────────

pub use catalog::{CatalogEntry, DeviceCatalog};
pub use change::{ChangeSet, RemoteBatch, SourceKind, Update};
pub use config::{DataType, DeviceConfig, EmergencyMode, UsageType};
pub use device::{Device, RemoteDeviceState, SavedDevice, SensorKind, SensorValue};
pub use mode::ArmMode;
pub use node_id::{MalformedNodeId, NodeId};
