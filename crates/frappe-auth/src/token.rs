//! Token endpoint requests and record types
//!
//! Both grant types POST a form body to the same token endpoint and parse
//! the same response JSON. `expires_in` is a delta in seconds from the
//! response time; callers convert it to an absolute unix-millisecond
//! expiry when building the `TokenRecord`.

use common::SecretString;
use serde::Deserialize;
use tracing::debug;

use crate::constants::DEFAULT_EXPIRES_IN_SECS;
use crate::endpoints::Endpoints;
use crate::error::{Error, Result, body_excerpt};

/// OAuth2 client identity, supplied at configuration time.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<SecretString>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Key under which tokens for this credential set are cached. Scoped by
    /// token URL so the same client id against two deployments cannot alias.
    pub fn cache_key(&self, token_url: &str) -> String {
        format!("{token_url}#{}", self.client_id)
    }
}

/// Response JSON from the token endpoint.
///
/// Frappe omits optional fields on some versions; absent `token_type`,
/// `expires_in`, and `scope` fall back to the protocol defaults.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Seconds until the access token expires (delta, not absolute).
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
    #[serde(default)]
    pub scope: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

fn default_expires_in() -> u64 {
    DEFAULT_EXPIRES_IN_SECS
}

/// A bearer token with its absolute expiry.
///
/// `expires_at` is a unix timestamp in milliseconds. Records are replaced
/// wholesale on refresh, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub access_token: String,
    pub token_type: String,
    pub scope: String,
    /// Expiry as a unix timestamp in milliseconds.
    pub expires_at: u64,
}

impl TokenRecord {
    /// Convert a wire response into a record anchored at `now_millis`.
    pub fn from_response(response: TokenResponse, now_millis: u64) -> Self {
        Self {
            access_token: response.access_token,
            token_type: response.token_type,
            scope: response.scope,
            expires_at: now_millis + response.expires_in * 1000,
        }
    }
}

/// Current unix time in milliseconds.
pub(crate) fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// POST `grant_type=client_credentials` to the token endpoint.
///
/// A non-success status means the server rejected the client credential
/// pair itself, surfaced as `Authentication` with the status and a body
/// excerpt.
pub async fn request_client_credentials(
    client: &reqwest::Client,
    endpoints: &Endpoints,
    credentials: &ClientCredentials,
) -> Result<TokenResponse> {
    let response = client
        .post(&endpoints.token_url)
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.expose()),
        ])
        .send()
        .await
        .map_err(|e| Error::Network {
            step: "token request",
            detail: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::Authentication {
            status: status.as_u16(),
            body: body_excerpt(&body),
        });
    }

    let parsed = response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::UnexpectedResponse {
            step: "token request",
            detail: format!("invalid token response: {e}"),
        })?;
    debug!(expires_in = parsed.expires_in, "service token issued");
    Ok(parsed)
}

/// POST `grant_type=authorization_code` with the code lifted from the
/// consent redirect.
pub async fn exchange_code(
    client: &reqwest::Client,
    endpoints: &Endpoints,
    credentials: &ClientCredentials,
    code: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(&endpoints.token_url)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", endpoints.redirect_uri.as_str()),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.expose()),
        ])
        .send()
        .await
        .map_err(|e| Error::Network {
            step: "code exchange",
            detail: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::TokenExchangeFailed {
            status: status.as_u16(),
            body: body_excerpt(&body),
        });
    }

    let parsed = response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::UnexpectedResponse {
            step: "code exchange",
            detail: format!("invalid token response: {e}"),
        })?;
    debug!(expires_in = parsed.expires_in, "user token issued");
    Ok(parsed)
}
