//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use sensorhub_config::ConfigError;
use sensorhub_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the hub: {reason}")]
    #[diagnostic(
        code(sensorhub::connection_failed),
        help(
            "Check that the hub is running and reachable from this machine.\n\
             Self-signed certificate? Try --insecure (-k)."
        )
    )]
    ConnectionFailed { reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Session rejected by the hub")]
    #[diagnostic(
        code(sensorhub::auth_failed),
        help("Sign in again with: sensorhub login --profile {profile}")
    )]
    AuthFailed { profile: String },

    #[error("No token configured for profile '{profile}'")]
    #[diagnostic(
        code(sensorhub::no_credentials),
        help(
            "Store one with: sensorhub login\n\
             Or set the SENSORHUB_TOKEN environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("Device '{identifier}' not found")]
    #[diagnostic(
        code(sensorhub::not_found),
        help("Run: sensorhub devices list to see known devices")
    )]
    NotFound { identifier: String },

    #[error("Rejected by the hub: {message}")]
    #[diagnostic(code(sensorhub::rejected))]
    Rejected { message: String },

    #[error("Malformed response from the hub: {message}")]
    #[diagnostic(code(sensorhub::malformed_payload))]
    MalformedPayload { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(sensorhub::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(sensorhub::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: sensorhub config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No hub configured")]
    #[diagnostic(
        code(sensorhub::no_config),
        help(
            "Create a profile with: sensorhub config init\n\
             Expected at: {path}\n\
             Or pass --api-url and --token."
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(sensorhub::config))]
    Config(ConfigError),

    #[error("Local settings storage failed: {message}")]
    #[diagnostic(
        code(sensorhub::storage),
        help("Check that the data directory is writable (see --data-dir).")
    )]
    Storage { message: String },

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(sensorhub::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(sensorhub::timeout),
        help("Increase timeout with --timeout or check hub responsiveness.")
    )]
    Timeout { seconds: u64 },

    #[error("Monitor stopped before the operation completed")]
    #[diagnostic(code(sensorhub::stopped))]
    Stopped,

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON encoding failed: {0}")]
    #[diagnostic(code(sensorhub::json))]
    Json(#[from] serde_json::Error),

    #[error("YAML encoding failed: {0}")]
    #[diagnostic(code(sensorhub::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Rejected { .. } => exit_code::CONFLICT,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            Self::Config(ConfigError::NoCredentials { .. }) => exit_code::AUTH,
            Self::Config(ConfigError::Validation { .. }) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    /// Attach the active profile to an authorization failure.
    pub fn for_profile(self, profile: &str) -> Self {
        match self {
            Self::AuthFailed { .. } => Self::AuthFailed {
                profile: profile.into(),
            },
            other => other,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },
            CoreError::NetworkError { reason } => CliError::ConnectionFailed { reason },
            CoreError::Unauthorized => CliError::AuthFailed {
                profile: "current".into(),
            },
            CoreError::Rejected { message } => CliError::Rejected { message },
            CoreError::MalformedPayload { message } => CliError::MalformedPayload { message },
            CoreError::UnknownDevice { node_id } => CliError::NotFound {
                identifier: node_id,
            },
            CoreError::Storage { message } => CliError::Storage { message },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::MonitorStopped => CliError::Stopped,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        assert_eq!(CliError::from(CoreError::Unauthorized).exit_code(), exit_code::AUTH);
        assert_eq!(
            CliError::from(CoreError::UnknownDevice {
                node_id: "sensor_42".into()
            })
            .exit_code(),
            exit_code::NOT_FOUND
        );
        assert_eq!(
            CliError::from(CoreError::NetworkError {
                reason: "refused".into()
            })
            .exit_code(),
            exit_code::CONNECTION
        );
        assert_eq!(
            CliError::from(CoreError::Timeout { timeout_secs: 10 }).exit_code(),
            exit_code::TIMEOUT
        );
    }

    #[test]
    fn config_errors_keep_their_category() {
        let err = CliError::from(ConfigError::NoCredentials {
            profile: "home".into(),
        });
        assert!(matches!(err, CliError::NoCredentials { ref profile } if profile == "home"));
        assert_eq!(err.exit_code(), exit_code::AUTH);

        let err = CliError::from(ConfigError::UnknownProfile { name: "x".into() });
        assert_eq!(err.exit_code(), exit_code::GENERAL);
    }

    #[test]
    fn auth_failure_names_the_profile() {
        let err = CliError::from(CoreError::Unauthorized).for_profile("home");
        assert!(matches!(err, CliError::AuthFailed { ref profile } if profile == "home"));
    }
}
