//! Bearer-token validation via the OpenID profile endpoint
//!
//! Outside the grant flows themselves. A caller can confirm a token is
//! live and read the identity behind it before trusting a long-lived
//! session with it.

use serde::Deserialize;

use crate::endpoints::Endpoints;
use crate::error::{Error, Result, body_excerpt};

/// Identity claims returned for a valid bearer token.
#[derive(Debug, Clone, Deserialize)]
pub struct UserClaims {
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Fetch the claims behind `access_token`, proving the server accepts it.
pub async fn fetch_userinfo(
    client: &reqwest::Client,
    endpoints: &Endpoints,
    access_token: &str,
) -> Result<UserClaims> {
    let response = client
        .get(&endpoints.userinfo_url)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| Error::Network {
            step: "userinfo",
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

    response
        .json::<UserClaims>()
        .await
        .map_err(|e| Error::UnexpectedResponse {
            step: "userinfo",
            detail: format!("invalid claims response: {e}"),
        })
}
