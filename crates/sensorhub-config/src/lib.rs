//! Shared configuration for sensorhub tools.
//!
//! TOML profiles, token resolution (env + keyring + plaintext), the
//! override-store location, and translation to
//! `sensorhub_core::MonitorConfig`. The CLI adds flag-aware wrappers on
//! top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sensorhub_core::{CatalogEntry, MergePolicy, MonitorConfig, NodeId, TlsVerification};

/// Service name under which tokens live in the system keyring.
pub const KEYRING_SERVICE: &str = "sensorhub";

/// Env var consulted when a profile names no `token_env` of its own.
pub const DEFAULT_TOKEN_ENV: &str = "SENSORHUB_TOKEN";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no token configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named hub profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Name of the profile to use: `requested`, else the configured
    /// default, else `"default"`.
    pub fn active_profile_name(&self, requested: Option<&str>) -> String {
        requested
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Snapshot poll interval in seconds while watching.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
            poll_interval: default_poll_interval(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    10
}
fn default_poll_interval() -> u64 {
    30
}

/// A named hub profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// REST root (e.g., "http://192.168.100.30:8000/api/").
    pub api_url: String,

    /// Push channel endpoint (e.g., "ws://192.168.100.30:8000/ws/security/").
    pub ws_url: Option<String>,

    /// Tenant id sent with list queries.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Session token (plaintext; prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the token.
    pub token_env: Option<String>,

    /// Scheme in front of the token in `Authorization`.
    pub auth_scheme: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout.
    pub timeout: Option<u64>,

    /// Override poll interval.
    pub poll_interval: Option<u64>,

    /// Reconnect the push channel after it drops.
    pub push_reconnect: Option<bool>,

    /// "arrival-order" or "newest-timestamp".
    pub merge_policy: Option<String>,

    /// Directory for the local override store.
    pub data_dir: Option<PathBuf>,

    /// Extra or replacement catalog entries, keyed by node id.
    #[serde(default)]
    pub devices: BTreeMap<String, CatalogEntry>,
}

fn default_client_id() -> String {
    "1".into()
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "sensorhub", "sensorhub")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Location of a profile's override store.
pub fn overrides_path(profile: &Profile, profile_name: &str) -> PathBuf {
    let base = profile.data_dir.clone().unwrap_or_else(|| {
        project_dirs().map_or_else(
            || dirs_fallback(".local/share"),
            |dirs| dirs.data_dir().to_path_buf(),
        )
    });
    base.join(profile_name).join("overrides.json")
}

fn dirs_fallback(sub: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(sub);
    p.push("sensorhub");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the full Config from `path` + environment.
///
/// Env keys use a double underscore as separator, e.g.
/// `SENSORHUB_DEFAULTS__TIMEOUT=20`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SENSORHUB_").split("__"));

    let config: Config = figment.extract()?;
    tracing::debug!(path = %path.display(), profiles = config.profiles.len(), "config loaded");
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution (without CLI flags) ────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token"))
}

/// Resolve the session token from the credential chain (no CLI flag step).
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's token_env (or the default env var)
    let env_name = profile.token_env.as_deref().unwrap_or(DEFAULT_TOKEN_ENV);
    if let Ok(val) = std::env::var(env_name) {
        if !val.trim().is_empty() {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(secret) = keyring_entry(profile_name).and_then(|entry| entry.get_password()) {
        return Ok(SecretString::from(secret));
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Save a token to the system keyring.
pub fn store_token(profile_name: &str, token: &SecretString) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(token.expose_secret())?;
    tracing::debug!(profile = profile_name, "token stored in keyring");
    Ok(())
}

/// Remove a profile's token from the system keyring. A missing entry is
/// not an error.
pub fn clear_token(profile_name: &str) -> Result<(), ConfigError> {
    match keyring_entry(profile_name)?.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a `MonitorConfig` from a profile, with the token already
/// resolved. Global `defaults` fill whatever the profile leaves unset.
pub fn profile_to_monitor_config(
    profile: &Profile,
    token: SecretString,
    defaults: &Defaults,
) -> Result<MonitorConfig, ConfigError> {
    let api_url = parse_url("api_url", &profile.api_url)?;
    let mut config = MonitorConfig::new(api_url, token);

    config.ws_url = profile
        .ws_url
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| parse_url("ws_url", raw))
        .transpose()?;
    if !profile.client_id.trim().is_empty() {
        config.client_id.clone_from(&profile.client_id);
    }
    if let Some(ref scheme) = profile.auth_scheme {
        config.auth_scheme.clone_from(scheme);
    }

    config.tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.poll_interval_secs = profile.poll_interval.unwrap_or(defaults.poll_interval);
    config.push_reconnect = profile.push_reconnect.unwrap_or(true);

    if let Some(ref raw) = profile.merge_policy {
        config.merge_policy =
            MergePolicy::from_str(raw).map_err(|_| ConfigError::Validation {
                field: "merge_policy".into(),
                reason: format!("expected 'arrival-order' or 'newest-timestamp', got '{raw}'"),
            })?;
    }

    for (raw_id, entry) in &profile.devices {
        let node_id = NodeId::parse(raw_id.as_str()).map_err(|e| ConfigError::Validation {
            field: format!("devices.{raw_id}"),
            reason: e.to_string(),
        })?;
        config
            .catalog
            .insert(&node_id, entry.name.clone(), entry.sensor_type.clone());
    }

    Ok(config)
}

fn parse_url(field: &str, raw: &str) -> Result<url::Url, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })
}
