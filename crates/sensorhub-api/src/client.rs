// REST client for the sensor hub API
//
// Wraps `reqwest::Client` with token-header injection, base-URL joining
// and status-code classification. Endpoint methods live in `sensors.rs`
// as inherent methods to keep this module focused on transport mechanics.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::ErrorBody;
use crate::transport::{DEFAULT_TIMEOUT, TransportConfig};

/// Authorization scheme the hub expects in front of the token.
pub const DEFAULT_AUTH_SCHEME: &str = "Token";

/// Raw HTTP client for the sensor hub.
///
/// Every request carries `Authorization: {scheme} {token}`. The token is
/// passed per call rather than stored, so a session invalidation on the
/// caller's side takes effect on the very next request.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    client_id: String,
    auth_scheme: String,
    timeout_secs: u64,
}

impl ApiClient {
    /// Create a new client from a `TransportConfig`.
    ///
    /// `base_url` is the API root, e.g. `http://192.168.100.30:8000/api/`.
    /// A missing trailing slash is added so relative joins stay under it.
    pub fn new(base_url: Url, client_id: String, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url: normalize_base(base_url),
            client_id,
            auth_scheme: DEFAULT_AUTH_SCHEME.into(),
            timeout_secs: transport.timeout_secs(),
        })
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, client_id: String) -> Self {
        Self {
            http,
            base_url: normalize_base(base_url),
            client_id,
            auth_scheme: DEFAULT_AUTH_SCHEME.into(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }

    /// Override the authorization scheme (default `Token`).
    pub fn with_auth_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.auth_scheme = scheme.into();
        self
    }

    /// The API root URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The tenant/client id sent with list queries.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build a full URL for an endpoint path relative to the API root.
    pub(crate) fn api_url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    /// Build an endpoint URL scoped to this client id (`?client_id=..`).
    pub(crate) fn client_scoped_url(&self, path: &str) -> Result<Url, Error> {
        let mut url = self.api_url(path)?;
        url.query_pairs_mut().append_pair("client_id", &self.client_id);
        Ok(url)
    }

    // ── Request helpers ──────────────────────────────────────────────

    fn authorization(&self, token: &SecretString) -> String {
        format!("{} {}", self.auth_scheme, token.expose_secret())
    }

    /// Send a GET request and decode the JSON body.
    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        url: Url,
        token: &SecretString,
    ) -> Result<T, Error> {
        debug!("GET {}", url);

        let req = self
            .http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.authorization(token));

        let body = self.execute(req).await?;
        decode(&body)
    }

    /// Send a POST request with a JSON body and return the raw response body.
    pub(crate) async fn post(
        &self,
        url: Url,
        token: &SecretString,
        body: &impl Serialize,
    ) -> Result<String, Error> {
        debug!("POST {}", url);

        let req = self
            .http
            .post(url)
            .header(reqwest::header::AUTHORIZATION, self.authorization(token))
            .json(body);

        self.execute(req).await
    }

    /// Send a DELETE request and return the raw response body.
    pub(crate) async fn delete(&self, url: Url, token: &SecretString) -> Result<String, Error> {
        debug!("DELETE {}", url);

        let req = self
            .http
            .delete(url)
            .header(reqwest::header::AUTHORIZATION, self.authorization(token));

        self.execute(req).await
    }

    /// Send the request and classify the response status.
    ///
    /// 401 maps to [`Error::Unauthorized`]; any other non-2xx status to
    /// [`Error::Api`] carrying the server's `error`/`detail` message when
    /// present.
    async fn execute(&self, req: reqwest::RequestBuilder) -> Result<String, Error> {
        let resp = req
            .send()
            .await
            .map_err(|e| Error::from_reqwest(e, self.timeout_secs))?;

        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthorized);
        }

        let body = resp
            .text()
            .await
            .map_err(|e| Error::from_reqwest(e, self.timeout_secs))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(ErrorBody::into_message)
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("unexpected status")
                        .to_owned()
                });
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(body)
    }
}

/// Decode a JSON body, keeping the raw text on failure.
pub(crate) fn decode<T: DeserializeOwned>(body: &str) -> Result<T, Error> {
    serde_json::from_str(body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: body.to_owned(),
    })
}

fn normalize_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
