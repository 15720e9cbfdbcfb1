// ── Snapshot fetcher ──
//
// One-shot pull of the full status map. No side effects: the result is
// handed to the reconciler by the caller.

use secrecy::SecretString;

use sensorhub_api::ApiClient;

use crate::convert::remote_batch;
use crate::error::CoreError;
use crate::model::RemoteBatch;

/// Pulls the full device-status map from the hub.
#[derive(Debug, Clone)]
pub struct SnapshotFetcher {
    client: ApiClient,
}

impl SnapshotFetcher {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Fetch every node's remote state.
    ///
    /// A 401 comes back as [`CoreError::Unauthorized`], distinct from
    /// [`CoreError::Timeout`] and [`CoreError::NetworkError`].
    pub async fn fetch(&self, token: &SecretString) -> Result<RemoteBatch, CoreError> {
        let map = self.client.fetch_sensor_status(token).await?;
        Ok(remote_batch(map))
    }
}
