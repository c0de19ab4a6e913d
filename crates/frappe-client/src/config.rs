//! Configuration types and loading
//!
//! TOML file with an environment overlay for secrets. Secret material is
//! never stored in the TOML itself: the OAuth client secret is resolved
//! from the FRAPPE_OAUTH_CLIENT_SECRET env var or `client_secret_file`,
//! the API secret from FRAPPE_API_SECRET or `secret_file`. Env vars win
//! over files; whitespace-only sources count as unset.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use common::{Error, Result, SecretString};
use frappe_auth::constants::{DEFAULT_EXPIRY_BUFFER_SECS, DEFAULT_SCOPE};

/// Root configuration.
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    pub frappe: FrappeConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub oauth: Option<OAuthConfig>,
    #[serde(default)]
    pub api_key: Option<ApiKeyConfig>,
}

/// Identity provider (the Frappe deployment issuing tokens).
#[derive(Debug, Deserialize)]
pub struct FrappeConfig {
    pub base_url: String,
}

/// Resource server the dispatcher calls.
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// OAuth2 client registration details.
#[derive(Debug, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<SecretString>,
    /// Path to a file holding the client secret (alternative to the
    /// FRAPPE_OAUTH_CLIENT_SECRET env var).
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(default = "default_cache_tokens")]
    pub cache_tokens: bool,
    #[serde(default = "default_token_buffer")]
    pub token_buffer_secs: u64,
    #[serde(default = "default_scope")]
    pub scope: String,
}

/// Pre-shared API key pair, used only when no OAuth client is configured.
#[derive(Debug, Deserialize)]
pub struct ApiKeyConfig {
    pub key: String,
    #[serde(skip)]
    pub secret: Option<SecretString>,
    /// Path to a file holding the API secret (alternative to the
    /// FRAPPE_API_SECRET env var).
    #[serde(default)]
    pub secret_file: Option<PathBuf>,
}

fn default_timeout() -> u64 {
    30
}

fn default_cache_tokens() -> bool {
    true
}

fn default_token_buffer() -> u64 {
    DEFAULT_EXPIRY_BUFFER_SECS
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

impl ClientConfig {
    /// Load configuration from a TOML file, then overlay environment
    /// variables for secret material.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: ClientConfig = toml::from_str(&contents)?;

        validate_url("frappe.base_url", &config.frappe.base_url)?;
        validate_url("api.base_url", &config.api.base_url)?;

        if config.api.timeout_secs == 0 {
            return Err(Error::Config(
                "api.timeout_secs must be greater than 0".into(),
            ));
        }

        if let Some(oauth) = &mut config.oauth {
            oauth.client_secret = resolve_secret(
                "FRAPPE_OAUTH_CLIENT_SECRET",
                oauth.client_secret_file.as_deref(),
            )?;
        }
        if let Some(api_key) = &mut config.api_key {
            api_key.secret = resolve_secret("FRAPPE_API_SECRET", api_key.secret_file.as_deref())?;
        }

        Ok(config)
    }
}

fn validate_url(field: &str, value: &str) -> Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{field} must start with http:// or https://, got: {value}"
        )))
    }
}

/// Env var wins over file; whitespace-only content counts as unset.
fn resolve_secret(env_var: &str, file: Option<&Path>) -> Result<Option<SecretString>> {
    if let Ok(value) = std::env::var(env_var) {
        if !value.trim().is_empty() {
            return Ok(Some(SecretString::new(value)));
        }
    }
    if let Some(path) = file {
        let value = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read secret file {}: {e}", path.display()))
        })?;
        let value = value.trim();
        if !value.is_empty() {
            return Ok(Some(SecretString::new(value.to_owned())));
        }
    }
    Ok(None)
}
