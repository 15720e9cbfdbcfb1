// ── Core error types ──
//
// User-facing errors from sensorhub-core. Consumers never see HTTP
// status codes or JSON parse failures directly. The
// `From<sensorhub_api::Error>` impl translates transport-layer errors
// into the reconciliation taxonomy.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Remote errors ────────────────────────────────────────────────
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Network error: {reason}")]
    NetworkError { reason: String },

    #[error("Session rejected by the hub -- sign in again")]
    Unauthorized,

    #[error("Operation rejected by the hub: {message}")]
    Rejected { message: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Malformed payload: {message}")]
    MalformedPayload { message: String },

    #[error("Unknown device: {node_id}")]
    UnknownDevice { node_id: String },

    // ── Local errors ─────────────────────────────────────────────────
    #[error("Override storage error: {message}")]
    Storage { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Monitor has stopped")]
    MonitorStopped,
}

/// Discriminant of [`CoreError`], for policy decisions that only care
/// about the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    NetworkError,
    Unauthorized,
    Rejected,
    MalformedPayload,
    UnknownDevice,
    Storage,
    Config,
    MonitorStopped,
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::NetworkError { .. } => ErrorKind::NetworkError,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::Rejected { .. } => ErrorKind::Rejected,
            Self::MalformedPayload { .. } => ErrorKind::MalformedPayload,
            Self::UnknownDevice { .. } => ErrorKind::UnknownDevice,
            Self::Storage { .. } => ErrorKind::Storage,
            Self::Config { .. } => ErrorKind::Config,
            Self::MonitorStopped => ErrorKind::MonitorStopped,
        }
    }

    /// Only an authorization failure escalates past "state not updated
    /// this cycle".
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// Timeouts and network failures: the next poll may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::NetworkError { .. })
    }

    pub(crate) fn storage(message: impl std::fmt::Display) -> Self {
        Self::Storage {
            message: message.to_string(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<sensorhub_api::Error> for CoreError {
    fn from(err: sensorhub_api::Error) -> Self {
        match err {
            sensorhub_api::Error::Unauthorized => CoreError::Unauthorized,
            sensorhub_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            sensorhub_api::Error::Transport(ref e) if e.is_timeout() => {
                CoreError::Timeout { timeout_secs: 0 }
            }
            sensorhub_api::Error::Transport(e) => CoreError::NetworkError {
                reason: e.to_string(),
            },
            sensorhub_api::Error::PushConnect(reason) => CoreError::NetworkError { reason },
            sensorhub_api::Error::Tls(msg) => CoreError::NetworkError {
                reason: format!("TLS error: {msg}"),
            },
            sensorhub_api::Error::Api { status, message } if status >= 500 => {
                CoreError::NetworkError {
                    reason: format!("HTTP {status}: {message}"),
                }
            }
            sensorhub_api::Error::Api { message, .. } => CoreError::Rejected { message },
            sensorhub_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            sensorhub_api::Error::Deserialization { message, body: _ } => {
                CoreError::MalformedPayload { message }
            }
        }
    }
}
