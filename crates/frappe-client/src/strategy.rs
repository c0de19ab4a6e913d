//! Authentication strategies for outbound requests
//!
//! The dispatcher is decoupled from credential acquisition through the
//! `AuthStrategy` trait. `OAuth2Strategy` drives the client-credentials
//! provider and its cache; `ApiKeyStrategy` is the pre-shared key scheme
//! for deployments without an OAuth client. Which one a dispatcher uses is
//! decided once, from configuration.
//!
//! Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
//! (`Arc<dyn AuthStrategy>`).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};

use common::SecretString;
use frappe_auth::{
    AuthorizationCodeFlow, ClientCredentials, ClientCredentialsProvider, Endpoints, Error, Result,
    TokenCache,
};

use crate::config::ClientConfig;

/// Abstraction over how outbound requests get their credential.
pub trait AuthStrategy: Send + Sync {
    /// Identifier for logging ("oauth2" or "api_key").
    fn id(&self) -> &'static str;

    /// Attach this strategy's credential to the outgoing headers.
    fn apply<'a>(
        &'a self,
        headers: &'a mut HeaderMap,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Discard any cached credential after the server rejected it.
    fn invalidate(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Bearer-token strategy backed by the client-credentials provider.
pub struct OAuth2Strategy {
    provider: ClientCredentialsProvider,
}

impl OAuth2Strategy {
    pub fn new(provider: ClientCredentialsProvider) -> Self {
        Self { provider }
    }
}

impl AuthStrategy for OAuth2Strategy {
    fn id(&self) -> &'static str {
        "oauth2"
    }

    fn apply<'a>(
        &'a self,
        headers: &'a mut HeaderMap,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let record = self.provider.get_token().await?;
            let mut value = HeaderValue::from_str(&format!("Bearer {}", record.access_token))
                .map_err(|e| Error::UnexpectedResponse {
                    step: "bearer header",
                    detail: format!("token not representable as a header value: {e}"),
                })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
            Ok(())
        })
    }

    fn invalidate(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move { self.provider.invalidate().await })
    }
}

/// Pre-shared key fallback: `Authorization: token <key>:<secret>`.
pub struct ApiKeyStrategy {
    key: String,
    secret: SecretString,
}

impl ApiKeyStrategy {
    pub fn new(key: impl Into<String>, secret: impl Into<SecretString>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }
}

impl AuthStrategy for ApiKeyStrategy {
    fn id(&self) -> &'static str {
        "api_key"
    }

    fn apply<'a>(
        &'a self,
        headers: &'a mut HeaderMap,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut value =
                HeaderValue::from_str(&format!("token {}:{}", self.key, self.secret.expose()))
                    .map_err(|e| {
                        Error::Configuration(format!(
                            "API key pair not representable as a header value: {e}"
                        ))
                    })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
            Ok(())
        })
    }

    /// Nothing cached to discard.
    fn invalidate(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async {})
    }
}

/// Configuration-time strategy selection: OAuth2 when an OAuth client is
/// configured, the API key scheme otherwise. Never both, never at runtime.
pub fn from_config(
    config: &ClientConfig,
    http: reqwest::Client,
) -> common::Result<Arc<dyn AuthStrategy>> {
    if let Some(oauth) = &config.oauth {
        let cache = oauth
            .cache_tokens
            .then(|| Arc::new(TokenCache::new(Duration::from_secs(oauth.token_buffer_secs))));
        let secret = oauth
            .client_secret
            .clone()
            .unwrap_or_else(|| SecretString::new(""));
        let provider = ClientCredentialsProvider::new(
            http,
            Endpoints::frappe(&config.frappe.base_url),
            ClientCredentials::new(oauth.client_id.clone(), secret),
            cache,
        );
        return Ok(Arc::new(OAuth2Strategy::new(provider)));
    }

    if let Some(api_key) = &config.api_key {
        let secret = api_key
            .secret
            .clone()
            .unwrap_or_else(|| SecretString::new(""));
        return Ok(Arc::new(ApiKeyStrategy::new(api_key.key.clone(), secret)));
    }

    Err(common::Error::Config(
        "no authentication configured: set [oauth] or [api_key]".into(),
    ))
}

/// Build the interactive authorization-code flow for the configured OAuth
/// client. The resulting token is bound to the user who logs in and never
/// enters the dispatcher's shared cache.
pub fn authorization_flow_from_config(
    config: &ClientConfig,
) -> common::Result<AuthorizationCodeFlow> {
    let Some(oauth) = &config.oauth else {
        return Err(common::Error::Config(
            "the authorization-code flow requires an [oauth] client".into(),
        ));
    };
    let secret = oauth
        .client_secret
        .clone()
        .unwrap_or_else(|| SecretString::new(""));
    Ok(AuthorizationCodeFlow::new(
        Endpoints::frappe(&config.frappe.base_url),
        ClientCredentials::new(oauth.client_id.clone(), secret),
    )
    .with_scope(oauth.scope.clone())
    .with_timeout(Duration::from_secs(config.api.timeout_secs)))
}
