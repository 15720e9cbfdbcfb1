// ── Reconciler inputs and outputs ──

use std::collections::BTreeMap;
use std::sync::Arc;

use super::config::DeviceConfig;
use super::device::{Device, RemoteDeviceState};
use super::node_id::NodeId;

/// Raw node id → remote fields. Keys are validated by the reconciler,
/// so one bad id never sinks the rest of the batch.
pub type RemoteBatch = BTreeMap<String, RemoteDeviceState>;

/// Where an update came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SourceKind {
    Snapshot,
    Push,
    Override,
}

/// One input to [`Reconciler::apply`](crate::Reconciler::apply).
#[derive(Debug, Clone)]
pub enum Update {
    /// Full pull from the status endpoint.
    Snapshot(RemoteBatch),
    /// Partial frame from the push channel.
    Push(RemoteBatch),
    /// Local configuration write. Only fields set in `config` apply.
    Override { node_id: NodeId, config: DeviceConfig },
}

impl Update {
    pub fn source(&self) -> SourceKind {
        match self {
            Self::Snapshot(_) => SourceKind::Snapshot,
            Self::Push(_) => SourceKind::Push,
            Self::Override { .. } => SourceKind::Override,
        }
    }
}

/// Records whose content changed in one reconciler call.
///
/// Carries the full post-change record for every changed node, plus the
/// ids of records that were removed.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub changed: Vec<Arc<Device>>,
    pub removed: Vec<NodeId>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changed.len() + self.removed.len()
    }

    /// Every affected node id: changed first, then removed.
    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.changed
            .iter()
            .map(|d| &d.node_id)
            .chain(self.removed.iter())
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.ids().any(|id| id.as_str() == node_id)
    }

    /// Fold another change set into this one, keeping the latest record
    /// per node.
    pub fn extend(&mut self, other: ChangeSet) {
        for device in other.changed {
            self.removed.retain(|id| *id != device.node_id);
            match self.changed.iter_mut().find(|d| d.node_id == device.node_id) {
                Some(slot) => *slot = device,
                None => self.changed.push(device),
            }
        }
        for id in other.removed {
            self.changed.retain(|d| d.node_id != id);
            if !self.removed.contains(&id) {
                self.removed.push(id);
            }
        }
    }
}
