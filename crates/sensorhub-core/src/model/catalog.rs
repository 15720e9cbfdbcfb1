// ── Static device catalog ──
//
// Friendly names and sensor kinds for nodes the installation knows
// about. Used to name and type records before (or instead of) remote data.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::device::SensorKind;
use super::node_id::NodeId;

/// Catalog entry for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub sensor_type: SensorKind,
}

/// Node id → name/kind lookup table, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCatalog {
    entries: IndexMap<String, CatalogEntry>,
}

impl DeviceCatalog {
    /// An empty catalog: every node falls back to its normalized id.
    pub fn empty() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    pub fn lookup(&self, node_id: &NodeId) -> Option<&CatalogEntry> {
        self.entries.get(node_id.as_str())
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, node_id: &NodeId, name: impl Into<String>, sensor_type: SensorKind) {
        self.entries.insert(
            node_id.as_str().to_owned(),
            CatalogEntry {
                name: name.into(),
                sensor_type,
            },
        );
    }

    /// Catalog name, else the normalized node id.
    pub fn display_name(&self, node_id: &NodeId) -> String {
        self.lookup(node_id)
            .map_or_else(|| node_id.fallback_name(), |e| e.name.clone())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CatalogEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DeviceCatalog {
    fn default() -> Self {
        let builtin = [
            ("sensor_01", "Living Room Motion", SensorKind::Motion),
            ("sensor_02", "Kitchen Humidity", SensorKind::Humidity),
            ("sensor_04", "Window Vibration", SensorKind::Vibration),
            ("sensor_07", "Attic Temperature", SensorKind::Temperature),
        ];

        let entries = builtin
            .into_iter()
            .map(|(id, name, sensor_type)| {
                (
                    id.to_owned(),
                    CatalogEntry {
                        name: name.to_owned(),
                        sensor_type,
                    },
                )
            })
            .collect();

        Self { entries }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn builtin_entries() {
        let catalog = DeviceCatalog::default();
        assert_eq!(catalog.len(), 4);
        let id = NodeId::parse("sensor_04").unwrap();
        assert_eq!(catalog.display_name(&id), "Window Vibration");
        assert_eq!(catalog.lookup(&id).unwrap().sensor_type, SensorKind::Vibration);
    }

    #[test]
    fn insert_overrides_builtin() {
        let mut catalog = DeviceCatalog::default();
        let id = NodeId::parse("sensor_01").unwrap();
        catalog.insert(&id, "Hallway Motion", SensorKind::Motion);
        assert_eq!(catalog.display_name(&id), "Hallway Motion");
        assert_eq!(catalog.len(), 4);
    }
}
