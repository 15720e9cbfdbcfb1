// sensorhub-core: Device-state reconciliation between sensorhub-api and consumers (CLI).

pub mod bus;
pub mod config;
pub mod convert;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod monitor;
pub mod overrides;
pub mod session;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bus::{ChangeBus, Subscription};
pub use config::{MergePolicy, MonitorConfig, TlsVerification};
pub use error::{CoreError, ErrorKind};
pub use fetcher::SnapshotFetcher;
pub use monitor::{FocusSession, Monitor, NewDevice, SyncStatus};
pub use overrides::{
    ApiUplink, ConfigUplink, FileKv, KeyValueStore, LocalOverrideStore, MemoryKv,
};
pub use session::{SessionGuard, SessionInvalidator};
pub use store::Reconciler;
pub use stream::{DeviceFilter, DeviceStream};

// Hub payloads surfaced as-is.
pub use sensorhub_api::Notification;

// Re-export model types at the crate root for ergonomics.
pub use model::{
    ArmMode, CatalogEntry, ChangeSet, DataType, Device, DeviceCatalog, DeviceConfig,
    EmergencyMode, MalformedNodeId, NodeId, RemoteBatch, RemoteDeviceState, SavedDevice,
    SensorKind, SensorValue, SourceKind, Update, UsageType,
};
