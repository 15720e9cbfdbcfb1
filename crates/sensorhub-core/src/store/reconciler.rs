// ── Reconciler ──
//
// Sole writer of the authoritative device map. Merges snapshot, push
// and override input into one record per node id and reports which
// records actually changed. Stored per-device settings are kept here too,
// so a record created later starts out with its saved config.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::collection::{CollectionWrite, DeviceCollection};
use crate::config::MergePolicy;
use crate::model::{
    ChangeSet, Device, DeviceCatalog, DeviceConfig, NodeId, RemoteBatch, RemoteDeviceState,
    SavedDevice, SensorKind, SourceKind, Update,
};
use crate::stream::DeviceStream;

/// Merges every input source into the authoritative device map.
///
/// Each call holds the collection's write lock for its whole batch, so
/// subscribers only ever see fully merged records.
pub struct Reconciler {
    devices: DeviceCollection,
    catalog: DeviceCatalog,
    policy: MergePolicy,
    /// Known per-device settings, applied on record creation.
    stored: Mutex<HashMap<NodeId, DeviceConfig>>,
}

impl Reconciler {
    pub fn new(catalog: DeviceCatalog, policy: MergePolicy) -> Self {
        Self {
            devices: DeviceCollection::new(),
            catalog,
            policy,
            stored: Mutex::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &DeviceCatalog {
        &self.catalog
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Apply one update and return the records it changed.
    ///
    /// Never fails: malformed node ids are logged and skipped one by one.
    /// Re-applying an identical payload yields an empty change set.
    pub fn apply(&self, update: Update) -> ChangeSet {
        let source = update.source();
        let mut changes = ChangeSet::default();
        let mut w = self.devices.write();

        match update {
            Update::Snapshot(batch) | Update::Push(batch) => {
                self.merge_remote_batch(&mut w, source, batch, &mut changes);
            }
            Update::Override { node_id, config } => {
                if let Some(device) = self.merge_override(&w, &node_id, &config) {
                    changes.changed.push(w.upsert(device));
                }
            }
        }

        drop(w);
        if !changes.is_empty() {
            debug!(%source, changed = changes.len(), "update applied");
        }
        changes
    }

    /// Remember stored settings and merge them into the records that
    /// already exist. Records created later pick them up on creation.
    pub fn load_stored(&self, entries: Vec<(NodeId, DeviceConfig)>) -> ChangeSet {
        let mut changes = ChangeSet::default();
        let mut w = self.devices.write();

        for (node_id, config) in entries {
            self.remember(&node_id, &config);
            let Some(existing) = w.get(&node_id).map(Arc::clone) else {
                continue;
            };
            let mut device = (*existing).clone();
            device.config.merge(&config);
            if let Some(device) = changed(Some(existing.as_ref()), device) {
                changes.changed.push(w.upsert(device));
            }
        }

        drop(w);
        if !changes.is_empty() {
            debug!(changed = changes.len(), "stored settings applied");
        }
        changes
    }

    /// Insert saved devices whose id is not already present.
    ///
    /// Used as the fallback when the snapshot is unreachable; live
    /// records always win.
    pub fn restore(&self, saved: Vec<SavedDevice>) -> ChangeSet {
        let mut changes = ChangeSet::default();
        let mut w = self.devices.write();

        for entry in saved {
            if w.contains(&entry.node_id) {
                continue;
            }
            let device = self.with_stored(entry.into_device(&self.catalog));
            changes.changed.push(w.upsert(device));
        }

        drop(w);
        if !changes.is_empty() {
            debug!(restored = changes.len(), "saved devices restored");
        }
        changes
    }

    /// Insert or mark a record as removable (a device registered from
    /// this client). Existing remote fields are kept.
    pub fn register(&self, saved: SavedDevice) -> ChangeSet {
        let mut changes = ChangeSet::default();
        let mut w = self.devices.write();

        let device = match w.get(&saved.node_id) {
            Some(existing) if existing.removable => return changes,
            Some(existing) => Device {
                removable: true,
                ..(**existing).clone()
            },
            None => self.with_stored(saved.into_device(&self.catalog)),
        };
        changes.changed.push(w.upsert(device));
        changes
    }

    /// Delete a record and forget its stored settings. The only way a
    /// record ever leaves the map.
    pub fn remove(&self, node_id: &NodeId) -> ChangeSet {
        let mut changes = ChangeSet::default();
        self.stored.lock().remove(node_id);
        if self.devices.write().remove(node_id).is_some() {
            debug!(%node_id, "device removed");
            changes.removed.push(node_id.clone());
        }
        changes
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.devices.snapshot()
    }

    pub fn get(&self, node_id: &str) -> Option<Arc<Device>> {
        self.devices.get(node_id)
    }

    pub fn subscribe(&self) -> DeviceStream {
        DeviceStream::new(self.devices.subscribe())
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Merge rules ──────────────────────────────────────────────────

    fn merge_remote_batch(
        &self,
        w: &mut CollectionWrite<'_>,
        source: SourceKind,
        batch: RemoteBatch,
        changes: &mut ChangeSet,
    ) {
        for (raw_id, remote) in batch {
            let node_id = match NodeId::parse(raw_id) {
                Ok(id) => id,
                Err(e) => {
                    warn!(%source, error = %e, "skipping update for malformed node id");
                    continue;
                }
            };

            if let Some(device) = self.merge_remote(w.get(&node_id).map(Arc::as_ref), node_id, &remote)
            {
                changes.changed.push(w.upsert(device));
            }
        }
    }

    /// Merge remote fields into a record. Returns the new record, or
    /// `None` if nothing changed.
    fn merge_remote(
        &self,
        existing: Option<&Device>,
        node_id: NodeId,
        remote: &RemoteDeviceState,
    ) -> Option<Device> {
        if self.is_stale(existing, remote) {
            debug!(%node_id, "dropping out-of-order remote update");
            return None;
        }

        let mut device = existing
            .cloned()
            .unwrap_or_else(|| self.new_record(node_id));

        if let Some(connected) = remote.connected {
            device.connected = connected;
        }
        if let Some(tag) = remote.sensor_type.as_deref().filter(|t| !t.trim().is_empty()) {
            device.sensor_type = SensorKind::from_tag(tag);
        }
        if let Some(value) = &remote.value {
            device.value = Some(value.clone());
        }
        if let Some(unit) = &remote.unit {
            device.unit = Some(unit.clone());
        }
        if let Some(ts) = remote.timestamp {
            device.timestamp = Some(ts);
        }

        changed(existing, device)
    }

    /// Merge config fields into a record; remote fields are untouched.
    fn merge_override(
        &self,
        w: &CollectionWrite<'_>,
        node_id: &NodeId,
        patch: &DeviceConfig,
    ) -> Option<Device> {
        self.remember(node_id, patch);
        let existing = w.get(node_id).map(Arc::as_ref);
        let mut device = existing
            .cloned()
            .unwrap_or_else(|| self.new_record(node_id.clone()));
        device.config.merge(patch);
        changed(existing, device)
    }

    fn remember(&self, node_id: &NodeId, patch: &DeviceConfig) {
        self.stored
            .lock()
            .entry(node_id.clone())
            .or_default()
            .merge(patch);
    }

    /// A default record for a node seen for the first time.
    fn new_record(&self, node_id: NodeId) -> Device {
        self.with_stored(Device::new(node_id, &self.catalog))
    }

    fn with_stored(&self, mut device: Device) -> Device {
        if let Some(config) = self.stored.lock().get(&device.node_id) {
            device.config.merge(config);
        }
        device
    }

    fn is_stale(&self, existing: Option<&Device>, remote: &RemoteDeviceState) -> bool {
        if self.policy != MergePolicy::NewestTimestamp {
            return false;
        }
        match (existing.and_then(|d| d.timestamp), remote.timestamp) {
            (Some(stored), Some(incoming)) => incoming < stored,
            _ => false,
        }
    }
}

/// `Some(next)` if `next` differs from what was stored (or is new).
fn changed(existing: Option<&Device>, next: Device) -> Option<Device> {
    match existing {
        Some(prev) if *prev == next => None,
        _ => Some(next),
    }
}
