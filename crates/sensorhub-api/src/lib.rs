// sensorhub-api: Async Rust client for the sensor hub REST API and live status channel

pub mod client;
pub mod error;
pub mod models;
pub mod push;
pub mod sensors;
pub mod transport;

pub use client::ApiClient;
pub use error::Error;
pub use models::{
    DeviceRegistration, ModeRequest, ModeResponse, Notification, RegistrationResponse,
    SensorStateRequest, SensorStatus, SensorStatusMap,
};
pub use push::{PushChannel, PushHandle, PushListener, PushOptions, PushUpdate, ReconnectConfig};
pub use transport::{TlsMode, TransportConfig};
