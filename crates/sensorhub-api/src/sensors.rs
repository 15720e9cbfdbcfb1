// Sensor endpoints
//
// Snapshot fetch, outbound state push, sensor-type catalog, device
// registration and removal, notifications and the system arm mode. All
// calls are token-authenticated.

use secrecy::SecretString;
use serde_json::Value;
use tracing::debug;

use crate::client::{ApiClient, decode};
use crate::error::Error;
use crate::models::{
    DeviceRegistration, ModeRequest, ModeResponse, Notification, RegistrationResponse,
    SensorStateRequest, SensorStatusMap, SensorTypesResponse, decode_status_map,
    unwrap_status_body,
};

impl ApiClient {
    /// Fetch the full status map for every sensor known to this client id.
    ///
    /// `GET sensor-status/?client_id=..`. Individual undecodable entries
    /// are skipped; a body that is not an object at all is an error.
    pub async fn fetch_sensor_status(&self, token: &SecretString) -> Result<SensorStatusMap, Error> {
        let url = self.client_scoped_url("sensor-status/")?;
        let body: Value = self.get(url, token).await?;
        let data = unwrap_status_body(body);

        let raw = data.to_string();
        let (map, rejected) = decode_status_map(data)
            .map_err(|message| Error::Deserialization { message, body: raw })?;

        debug!(sensors = map.len(), rejected, "sensor status fetched");
        Ok(map)
    }

    /// Push a device's connected state upstream.
    ///
    /// `POST sensor/` with `{sensor_id, state}`. The response body is
    /// ignored.
    pub async fn push_sensor_state(
        &self,
        token: &SecretString,
        sensor_id: &str,
        state: bool,
    ) -> Result<(), Error> {
        let url = self.api_url("sensor/")?;
        let body = SensorStateRequest {
            sensor_id: sensor_id.to_owned(),
            state,
        };
        self.post(url, token, &body).await?;
        Ok(())
    }

    /// List the sensor categories the hub accepts for registration.
    pub async fn list_sensor_types(&self, token: &SecretString) -> Result<Vec<String>, Error> {
        let url = self.api_url("sensor-types/")?;
        let resp: SensorTypesResponse = self.get(url, token).await?;
        Ok(resp.sensor_types)
    }

    /// Register a new sensor node with the hub.
    pub async fn register_device(
        &self,
        token: &SecretString,
        registration: &DeviceRegistration,
    ) -> Result<RegistrationResponse, Error> {
        let url = self.api_url("devices/")?;
        let body = self.post(url, token, registration).await?;
        if body.trim().is_empty() {
            return Ok(RegistrationResponse::default());
        }
        decode(&body)
    }

    /// List notifications for this client id, newest first as the hub
    /// returns them.
    pub async fn list_notifications(&self, token: &SecretString) -> Result<Vec<Notification>, Error> {
        let url = self.client_scoped_url("notifications/")?;
        self.get(url, token).await
    }

    /// Remove a sensor node from the hub.
    ///
    /// `DELETE devices/{node_id}/?client_id=..`. The response body is
    /// ignored.
    pub async fn delete_device(&self, token: &SecretString, node_id: &str) -> Result<(), Error> {
        let url = self.client_scoped_url(&format!("devices/{node_id}/"))?;
        self.delete(url, token).await?;
        Ok(())
    }

    /// Current system arm mode, as the hub phrases it.
    pub async fn get_mode(&self, token: &SecretString) -> Result<ModeResponse, Error> {
        let url = self.api_url("mode/")?;
        self.get(url, token).await
    }

    /// Change the system arm mode (`POST mode/` with `{mode}`).
    pub async fn set_mode(&self, token: &SecretString, mode: &str) -> Result<(), Error> {
        let url = self.api_url("mode/")?;
        let body = ModeRequest {
            mode: mode.to_owned(),
        };
        self.post(url, token, &body).await?;
        Ok(())
    }
}
