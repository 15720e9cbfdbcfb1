// ── Reactive device collection ──
//
// Ordered storage with O(1) lookups and push-based change notification
// via a `watch` channel. All writes go through a `CollectionWrite`
// guard; the published snapshot is rebuilt before the lock is released,
// so readers never see a half-applied batch.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{RwLock, RwLockWriteGuard};
use tokio::sync::watch;

use crate::model::{Device, NodeId};

pub(crate) type DeviceSnapshot = Arc<Vec<Arc<Device>>>;

pub(crate) struct DeviceCollection {
    /// Primary storage in first-seen order.
    by_id: RwLock<IndexMap<NodeId, Arc<Device>>>,

    /// Version counter, bumped on every published mutation.
    version: watch::Sender<u64>,

    /// Full snapshot, rebuilt on mutation for cheap subscription.
    snapshot: watch::Sender<DeviceSnapshot>,
}

impl DeviceCollection {
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_id: RwLock::new(IndexMap::new()),
            version,
            snapshot,
        }
    }

    /// Take the write lock for one atomic batch.
    pub(crate) fn write(&self) -> CollectionWrite<'_> {
        CollectionWrite {
            map: self.by_id.write(),
            version: &self.version,
            snapshot: &self.snapshot,
            dirty: false,
        }
    }

    pub(crate) fn get(&self, node_id: &str) -> Option<Arc<Device>> {
        self.by_id.read().get(node_id).cloned()
    }

    /// Current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> DeviceSnapshot {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<DeviceSnapshot> {
        self.snapshot.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id.read().len()
    }

    pub(crate) fn version(&self) -> u64 {
        *self.version.borrow()
    }
}

/// Write access to a [`DeviceCollection`].
///
/// Dropping the guard publishes a new snapshot if anything changed.
pub(crate) struct CollectionWrite<'a> {
    map: RwLockWriteGuard<'a, IndexMap<NodeId, Arc<Device>>>,
    version: &'a watch::Sender<u64>,
    snapshot: &'a watch::Sender<DeviceSnapshot>,
    dirty: bool,
}

impl CollectionWrite<'_> {
    pub(crate) fn get(&self, node_id: &NodeId) -> Option<&Arc<Device>> {
        self.map.get(node_id)
    }

    pub(crate) fn contains(&self, node_id: &NodeId) -> bool {
        self.map.contains_key(node_id)
    }

    /// Insert or replace a record, returning the stored `Arc`.
    pub(crate) fn upsert(&mut self, device: Device) -> Arc<Device> {
        let device = Arc::new(device);
        self.map.insert(device.node_id.clone(), Arc::clone(&device));
        self.dirty = true;
        device
    }

    /// Remove a record, preserving the order of the rest.
    pub(crate) fn remove(&mut self, node_id: &NodeId) -> Option<Arc<Device>> {
        let removed = self.map.shift_remove(node_id);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &Arc<Device>> {
        self.map.values()
    }
}

impl Drop for CollectionWrite<'_> {
    fn drop(&mut self) {
        if !self.dirty {
            return;
        }
        let values: Vec<Arc<Device>> = self.map.values().cloned().collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
        self.version.send_modify(|v| *v += 1);
    }
}
