// ── Local override store ──
//
// Per-device configuration records (`device-<node_id>`) and the
// `savedDevices` fallback list, on top of a `KeyValueStore`. Writes are
// read-modify-write under one async mutex; a write that sets the
// connection override is mirrored upstream on a best-effort basis.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use secrecy::SecretString;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use sensorhub_api::ApiClient;

use super::kv::KeyValueStore;
use crate::error::CoreError;
use crate::model::{DeviceConfig, NodeId, SavedDevice};
use crate::session::SessionGuard;

const SAVED_DEVICES_KEY: &str = "savedDevices";
const DEVICE_KEY_PREFIX: &str = "device-";

// ── Uplink ──────────────────────────────────────────────────────────

/// Mirrors a locally set connection state to the hub.
pub trait ConfigUplink: Send + Sync {
    fn push_state<'a>(
        &'a self,
        node_id: &'a NodeId,
        state: bool,
    ) -> BoxFuture<'a, Result<(), CoreError>>;
}

/// [`ConfigUplink`] over the hub's `POST sensor/` endpoint.
pub struct ApiUplink {
    client: ApiClient,
    token: SecretString,
}

impl ApiUplink {
    pub fn new(client: ApiClient, token: SecretString) -> Self {
        Self { client, token }
    }
}

impl ConfigUplink for ApiUplink {
    fn push_state<'a>(
        &'a self,
        node_id: &'a NodeId,
        state: bool,
    ) -> BoxFuture<'a, Result<(), CoreError>> {
        Box::pin(async move {
            self.client
                .push_sensor_state(&self.token, node_id.as_str(), state)
                .await
                .map_err(CoreError::from)
        })
    }
}

// ── Store ───────────────────────────────────────────────────────────

/// Persisted per-device configuration.
pub struct LocalOverrideStore {
    kv: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
    uplink: Option<Arc<dyn ConfigUplink>>,
    session: Option<SessionGuard>,
}

impl LocalOverrideStore {
    /// A store without an uplink: writes stay local.
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
            uplink: None,
            session: None,
        }
    }

    /// Mirror connection overrides upstream; route `Unauthorized` from
    /// the uplink to `session`.
    pub fn with_uplink(mut self, uplink: Arc<dyn ConfigUplink>, session: SessionGuard) -> Self {
        self.uplink = Some(uplink);
        self.session = Some(session);
        self
    }

    /// Stored config for `node_id`, if any.
    pub async fn get(&self, node_id: &NodeId) -> Result<Option<DeviceConfig>, CoreError> {
        let _guard = self.write_lock.lock().await;
        self.read_config(&node_id.storage_key())
    }

    /// Shallow-merge `partial` into the stored record and return the
    /// merged config.
    ///
    /// The local write is the source of truth: an uplink failure is
    /// logged and never rolls it back.
    pub async fn put(
        &self,
        node_id: &NodeId,
        partial: &DeviceConfig,
    ) -> Result<DeviceConfig, CoreError> {
        let key = node_id.storage_key();
        let merged = {
            let _guard = self.write_lock.lock().await;
            let mut current = self.read_config(&key)?.unwrap_or_default();
            current.merge(partial);
            let encoded = serde_json::to_value(&current).map_err(CoreError::storage)?;
            self.kv.set(&key, encoded)?;
            current
        };
        debug!(%node_id, "override stored");

        if let (Some(uplink), Some(state)) = (&self.uplink, merged.connected_override) {
            if let Err(e) = uplink.push_state(node_id, state).await {
                warn!(%node_id, error = %e, "override uplink failed, keeping local value");
                if let Some(session) = &self.session {
                    session.observe(&e);
                }
            }
        }

        Ok(merged)
    }

    /// Drop the override record for `node_id`.
    pub async fn remove(&self, node_id: &NodeId) -> Result<(), CoreError> {
        let _guard = self.write_lock.lock().await;
        self.kv.remove(&node_id.storage_key())
    }

    /// Every stored override. Undecodable records are skipped.
    pub async fn all(&self) -> Result<Vec<(NodeId, DeviceConfig)>, CoreError> {
        let _guard = self.write_lock.lock().await;
        let mut out = Vec::new();

        for key in self.kv.keys()? {
            let Some(raw_id) = key.strip_prefix(DEVICE_KEY_PREFIX) else {
                continue;
            };
            let node_id = match NodeId::parse(raw_id) {
                Ok(id) => id,
                Err(e) => {
                    warn!(key, error = %e, "skipping override with malformed node id");
                    continue;
                }
            };
            match self.read_config(&key) {
                Ok(Some(config)) => out.push((node_id, config)),
                Ok(None) => {}
                Err(e) => warn!(key, error = %e, "skipping undecodable override"),
            }
        }

        Ok(out)
    }

    /// The persisted fallback list. Undecodable entries are skipped.
    pub async fn saved_devices(&self) -> Result<Vec<SavedDevice>, CoreError> {
        let _guard = self.write_lock.lock().await;
        self.read_saved()
    }

    /// Replace the persisted fallback list.
    pub async fn save_devices(&self, devices: &[SavedDevice]) -> Result<(), CoreError> {
        let _guard = self.write_lock.lock().await;
        self.write_saved(devices)
    }

    /// Read-modify-write of the fallback list under the store lock.
    pub async fn edit_saved_devices<R>(
        &self,
        edit: impl FnOnce(&mut Vec<SavedDevice>) -> R,
    ) -> Result<R, CoreError> {
        let _guard = self.write_lock.lock().await;
        let mut devices = self.read_saved()?;
        let result = edit(&mut devices);
        self.write_saved(&devices)?;
        Ok(result)
    }

    fn read_saved(&self) -> Result<Vec<SavedDevice>, CoreError> {
        let Some(raw) = self.kv.get(SAVED_DEVICES_KEY)? else {
            return Ok(Vec::new());
        };
        let Value::Array(entries) = raw else {
            return Err(CoreError::MalformedPayload {
                message: format!("{SAVED_DEVICES_KEY} is not a list"),
            });
        };

        Ok(entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<SavedDevice>(entry) {
                Ok(d) => Some(d),
                Err(e) => {
                    warn!(error = %e, "skipping undecodable saved device");
                    None
                }
            })
            .collect())
    }

    fn write_saved(&self, devices: &[SavedDevice]) -> Result<(), CoreError> {
        let encoded = serde_json::to_value(devices).map_err(CoreError::storage)?;
        self.kv.set(SAVED_DEVICES_KEY, encoded)
    }

    fn read_config(&self, key: &str) -> Result<Option<DeviceConfig>, CoreError> {
        self.kv
            .get(key)?
            .map(|raw| {
                serde_json::from_value(raw).map_err(|e| CoreError::MalformedPayload {
                    message: format!("override {key}: {e}"),
                })
            })
            .transpose()
    }
}
