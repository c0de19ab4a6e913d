//! Client-credentials grant with token caching
//!
//! Machine-to-machine token acquisition. The provider consults the shared
//! `TokenCache` first and only goes to the network on a miss. Concurrent
//! misses for the same credential key collapse through the cache's refresh
//! gate: one caller fetches, the rest wait and reuse its record.
//!
//! The provider itself never retries. Reacting to a rejected token
//! (invalidate and fetch once more) is the dispatcher's decision.

use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::TokenCache;
use crate::endpoints::Endpoints;
use crate::error::{Error, Result};
use crate::token::{self, ClientCredentials, TokenRecord, unix_millis};

/// Fetches service-level bearer tokens via `grant_type=client_credentials`.
pub struct ClientCredentialsProvider {
    http: reqwest::Client,
    endpoints: Endpoints,
    credentials: ClientCredentials,
    /// `None` disables caching: every `get_token` call fetches.
    cache: Option<Arc<TokenCache>>,
    cache_key: String,
}

impl ClientCredentialsProvider {
    pub fn new(
        http: reqwest::Client,
        endpoints: Endpoints,
        credentials: ClientCredentials,
        cache: Option<Arc<TokenCache>>,
    ) -> Self {
        let cache_key = credentials.cache_key(&endpoints.token_url);
        Self {
            http,
            endpoints,
            credentials,
            cache,
            cache_key,
        }
    }

    /// A valid bearer token for this credential set, cached or fresh.
    pub async fn get_token(&self) -> Result<TokenRecord> {
        let Some(cache) = &self.cache else {
            return self.fetch().await;
        };

        if let Some(record) = cache.get(&self.cache_key).await {
            debug!(client_id = %self.credentials.client_id, "token served from cache");
            return Ok(record);
        }

        let gate = cache.refresh_gate(&self.cache_key).await;
        let _refresh = gate.lock().await;

        // another caller may have refreshed while we waited on the gate
        if let Some(record) = cache.get(&self.cache_key).await {
            debug!(client_id = %self.credentials.client_id, "token refreshed by concurrent caller");
            return Ok(record);
        }

        let record = self.fetch().await?;
        cache.put(&self.cache_key, record.clone()).await;
        Ok(record)
    }

    /// Drop the cached token so the next `get_token` fetches fresh.
    pub async fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate(&self.cache_key).await;
        }
    }

    async fn fetch(&self) -> Result<TokenRecord> {
        if self.credentials.client_id.is_empty() {
            return Err(Error::Configuration("OAuth client id is not set".into()));
        }
        if self.credentials.client_secret.is_empty() {
            return Err(Error::Configuration("OAuth client secret is not set".into()));
        }

        let response =
            token::request_client_credentials(&self.http, &self.endpoints, &self.credentials)
                .await?;
        let record = TokenRecord::from_response(response, unix_millis());
        info!(
            client_id = %self.credentials.client_id,
            expires_at = record.expires_at,
            "service token obtained"
        );
        Ok(record)
    }
}
