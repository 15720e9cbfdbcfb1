use thiserror::Error;

/// Top-level error type for the `sensorhub-api` crate.
///
/// Covers every failure mode across the REST endpoints and the push
/// channel. `sensorhub-core` maps these into its own error taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The server rejected the token (HTTP 401).
    #[error("Unauthorized -- the session token was rejected")]
    Unauthorized,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── API ─────────────────────────────────────────────────────────
    /// Non-success HTTP status other than 401.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    // ── Push channel ────────────────────────────────────────────────
    /// Push channel connection failed or dropped with an error.
    #[error("Push channel connection failed: {0}")]
    PushConnect(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Wrap a reqwest error, promoting timeouts to [`Error::Timeout`].
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout { timeout_secs }
        } else {
            Self::Transport(err)
        }
    }

    /// Returns `true` if the server rejected the session token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// Returns `true` if this is a transient error worth retrying on the
    /// next poll.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Timeout { .. } | Self::PushConnect(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
