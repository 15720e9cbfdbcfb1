// ── Node identity ──
//
// `NodeId` is the unique key of the authoritative device map. Every
// source (snapshot, push, override, saved list) goes through `parse`
// before it can touch a record.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Placeholder the push server emits for frames without a node id.
const PLACEHOLDER_ID: &str = "unknown";

/// Why a raw identifier was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed node id {raw:?}: {reason}")]
pub struct MalformedNodeId {
    pub raw: String,
    pub reason: &'static str,
}

/// Stable external identifier of a sensor node, e.g. `sensor_01`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    /// Validate a raw identifier.
    ///
    /// Rejects blank ids, ids containing whitespace or control
    /// characters, and the server's `unknown` placeholder.
    pub fn parse(raw: impl Into<String>) -> Result<Self, MalformedNodeId> {
        let raw = raw.into();
        let reason = if raw.trim().is_empty() {
            Some("empty")
        } else if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            Some("contains whitespace or control characters")
        } else if raw.eq_ignore_ascii_case(PLACEHOLDER_ID) {
            Some("placeholder id")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(MalformedNodeId { raw, reason }),
            None => Ok(Self(raw)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display form used when the catalog has no name for this node:
    /// upper-cased, underscores replaced by spaces.
    pub fn fallback_name(&self) -> String {
        self.0.to_uppercase().replace('_', " ")
    }

    /// Key of this node's override record in the key-value store.
    pub fn storage_key(&self) -> String {
        format!("device-{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeId {
    type Err = MalformedNodeId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for NodeId {
    type Error = MalformedNodeId;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_ids() {
        let id = NodeId::parse("sensor_01").unwrap();
        assert_eq!(id.as_str(), "sensor_01");
        assert_eq!(id.storage_key(), "device-sensor_01");
    }

    #[test]
    fn rejects_malformed_ids() {
        for raw in ["", "   ", "sensor 01", "sensor\t01", "unknown", "UNKNOWN", "a\u{7}b"] {
            assert!(NodeId::parse(raw).is_err(), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn fallback_name_normalizes() {
        let id = NodeId::parse("sensor_09").unwrap();
        assert_eq!(id.fallback_name(), "SENSOR 09");
    }

    #[test]
    fn serde_validates() {
        let ok: NodeId = serde_json::from_str("\"sensor_04\"").unwrap();
        assert_eq!(ok.as_str(), "sensor_04");
        assert!(serde_json::from_str::<NodeId>("\"unknown\"").is_err());
    }
}
