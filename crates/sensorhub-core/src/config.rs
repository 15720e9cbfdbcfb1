// ── Runtime monitor configuration ──
//
// These types describe *how* to reach a sensor hub and how to merge
// what it reports. They carry the session token but never touch disk.
// The CLI builds a `MonitorConfig` (usually via sensorhub-config) and
// hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use sensorhub_api::client::DEFAULT_AUTH_SCHEME;
use sensorhub_api::transport::DEFAULT_TIMEOUT;

use crate::model::DeviceCatalog;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed hub on the LAN).
    DangerAcceptInvalid,
}

/// How remote updates for the same node are ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum MergePolicy {
    /// Last applied wins, whatever its timestamp. A slow snapshot can
    /// briefly regress fields a newer push frame set, until the next
    /// update arrives.
    #[default]
    ArrivalOrder,
    /// Drop a remote update whose timestamp is older than the stored
    /// one. Updates without a timestamp always apply.
    NewestTimestamp,
}

/// Configuration for monitoring one hub.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// REST root, e.g. `http://192.168.100.30:8000/api/`.
    pub api_url: Url,
    /// Push channel endpoint. `None` disables the push channel.
    pub ws_url: Option<Url>,
    /// Tenant id sent with list queries.
    pub client_id: String,
    pub token: SecretString,
    /// Scheme in front of the token (`Token` by default).
    pub auth_scheme: String,
    pub tls: TlsVerification,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Snapshot poll interval while focused (seconds). 0 = focus-only.
    pub poll_interval_secs: u64,
    /// Reconnect the push channel with backoff after it drops.
    pub push_reconnect: bool,
    pub merge_policy: MergePolicy,
    pub catalog: DeviceCatalog,
}

impl MonitorConfig {
    /// A config with defaults for everything but the endpoint and token.
    pub fn new(api_url: Url, token: SecretString) -> Self {
        Self {
            api_url,
            ws_url: None,
            client_id: "1".into(),
            token,
            auth_scheme: DEFAULT_AUTH_SCHEME.into(),
            tls: TlsVerification::default(),
            timeout: DEFAULT_TIMEOUT,
            poll_interval_secs: 30,
            push_reconnect: true,
            merge_policy: MergePolicy::default(),
            catalog: DeviceCatalog::default(),
        }
    }
}
