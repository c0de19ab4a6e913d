//! Authenticated request dispatch
//!
//! Composes an `AuthStrategy` with a resource-server base URL. The
//! dispatcher owns exactly one recovery behavior: a 401 invalidates the
//! strategy's cached credential and the request is retried once with a
//! fresh one. Every other status, success or failure, is handed back
//! untouched so callers can interpret domain error bodies themselves.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, Response, StatusCode};
use tracing::{debug, warn};

use frappe_auth::error::body_excerpt;
use frappe_auth::{Error, Result};

use crate::config::ClientConfig;
use crate::strategy::{self, AuthStrategy};
use crate::user::UserContext;

/// Issues authenticated calls against the resource server.
pub struct Dispatcher {
    http: reqwest::Client,
    base_url: String,
    strategy: Arc<dyn AuthStrategy>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        strategy: Arc<dyn AuthStrategy>,
        timeout: Duration,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            strategy,
            timeout,
        }
    }

    /// Assemble a dispatcher from configuration: OAuth2 when an OAuth
    /// client is configured, API key fallback otherwise.
    pub fn from_config(config: &ClientConfig) -> common::Result<Self> {
        let http = reqwest::Client::new();
        let strategy = strategy::from_config(config, http.clone())?;
        Ok(Self::new(
            http,
            config.api.base_url.clone(),
            strategy,
            Duration::from_secs(config.api.timeout_secs),
        ))
    }

    /// Issue `method path` with authentication attached.
    ///
    /// On a 401 the cached credential is dropped and the request retried
    /// exactly once; a second 401 surfaces as `Error::Authentication`.
    /// Other non-2xx responses are returned unmodified, not retried.
    pub async fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        user: Option<&UserContext>,
    ) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);

        let response = self.send(&method, &url, body, user).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!(
            strategy = self.strategy.id(),
            %url,
            "credential rejected, retrying once with a fresh one"
        );
        self.strategy.invalidate().await;

        let retry = self.send(&method, &url, body, user).await?;
        if retry.status() != StatusCode::UNAUTHORIZED {
            return Ok(retry);
        }

        let status = retry.status().as_u16();
        let text = retry
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        Err(Error::Authentication {
            status,
            body: body_excerpt(&text),
        })
    }

    /// GET without a body.
    pub async fn get(&self, path: &str, user: Option<&UserContext>) -> Result<Response> {
        self.dispatch(Method::GET, path, None, user).await
    }

    /// POST with a JSON body.
    pub async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
        user: Option<&UserContext>,
    ) -> Result<Response> {
        self.dispatch(Method::POST, path, Some(body), user).await
    }

    async fn send(
        &self,
        method: &Method,
        url: &str,
        body: Option<&serde_json::Value>,
        user: Option<&UserContext>,
    ) -> Result<Response> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.strategy.apply(&mut headers).await?;
        if let Some(user) = user {
            user.apply(&mut headers);
        }

        let mut request = self
            .http
            .request(method.clone(), url)
            .headers(headers)
            .timeout(self.timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(%method, %url, strategy = self.strategy.id(), "dispatching authenticated request");
        request.send().await.map_err(|e| Error::Network {
            step: "dispatch",
            detail: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use frappe_auth::{ClientCredentials, ClientCredentialsProvider, Endpoints, TokenCache};
    use wiremock::matchers::{header, method as http_method, path as url_path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    use crate::strategy::{ApiKeyStrategy, OAuth2Strategy};
    use crate::user::{USER_EMAIL_HEADER, UserContext};

    const TOKEN_PATH: &str = "/api/method/frappe.integrations.oauth2.get_token";

    /// Token endpoint that issues tok1 on the first call, tok2 after.
    async fn mount_rotating_token_endpoint(server: &MockServer, expected_calls: u64) {
        let calls = AtomicUsize::new(0);
        Mock::given(http_method("POST"))
            .and(url_path(TOKEN_PATH))
            .respond_with(move |_: &Request| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                let token = if n == 0 { "tok1" } else { "tok2" };
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "access_token": token,
                    "expires_in": 3600
                }))
            })
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn oauth_dispatcher(server_uri: &str) -> Dispatcher {
        let http = reqwest::Client::new();
        let provider = ClientCredentialsProvider::new(
            http.clone(),
            Endpoints::frappe(server_uri),
            ClientCredentials::new("abc", "xyz"),
            Some(Arc::new(TokenCache::default())),
        );
        Dispatcher::new(
            http,
            server_uri,
            Arc::new(OAuth2Strategy::new(provider)),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn happy_path_attaches_bearer_token() {
        let server = MockServer::start().await;
        mount_rotating_token_endpoint(&server, 1).await;

        Mock::given(http_method("GET"))
            .and(url_path("/api/v1/health"))
            .and(header("authorization", "Bearer tok1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = oauth_dispatcher(&server.uri());
        let response = dispatcher.get("/api/v1/health", None).await.unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn single_401_invalidates_and_retries_once() {
        let server = MockServer::start().await;
        // first resource call sees tok1 and rejects it; the retry carries a
        // fresh tok2 and succeeds, two token fetches total
        mount_rotating_token_endpoint(&server, 2).await;

        Mock::given(http_method("POST"))
            .and(url_path("/api/v1/chat"))
            .and(header("authorization", "Bearer tok1"))
            .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(http_method("POST"))
            .and(url_path("/api/v1/chat"))
            .and(header("authorization", "Bearer tok2"))
            .respond_with(ResponseTemplate::new(200).set_body_string("done"))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = oauth_dispatcher(&server.uri());
        let body = serde_json::json!({"message": "list projects"});
        let response = dispatcher.post("/api/v1/chat", &body, None).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "done");
    }

    #[tokio::test]
    async fn second_401_surfaces_authentication_error() {
        let server = MockServer::start().await;
        mount_rotating_token_endpoint(&server, 2).await;

        // exactly two attempts, never a third
        Mock::given(http_method("GET"))
            .and(url_path("/api/v1/tools"))
            .respond_with(ResponseTemplate::new(401).set_body_string("still unauthorized"))
            .expect(2)
            .mount(&server)
            .await;

        let dispatcher = oauth_dispatcher(&server.uri());
        let err = dispatcher.get("/api/v1/tools", None).await.unwrap_err();
        match err {
            Error::Authentication { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("still unauthorized"));
            }
            other => panic!("expected Authentication, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn other_error_statuses_pass_through_without_retry() {
        let server = MockServer::start().await;
        mount_rotating_token_endpoint(&server, 1).await;

        Mock::given(http_method("GET"))
            .and(url_path("/api/v1/broken"))
            .respond_with(ResponseTemplate::new(500).set_body_string("server exploded"))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = oauth_dispatcher(&server.uri());
        let response = dispatcher.get("/api/v1/broken", None).await.unwrap();
        assert_eq!(response.status(), 500);
        assert_eq!(response.text().await.unwrap(), "server exploded");
    }

    #[tokio::test]
    async fn user_context_headers_are_forwarded() {
        let server = MockServer::start().await;
        mount_rotating_token_endpoint(&server, 1).await;

        Mock::given(http_method("POST"))
            .and(url_path("/api/v1/chat"))
            .and(header(USER_EMAIL_HEADER, "a@b.com"))
            .and(header("x-frappe-user-id", "a@b.com"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = oauth_dispatcher(&server.uri());
        let user = UserContext::from_email("a@b.com");
        let body = serde_json::json!({"message": "hello"});
        let response = dispatcher
            .post("/api/v1/chat", &body, Some(&user))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn no_user_context_means_no_user_headers() {
        let server = MockServer::start().await;
        mount_rotating_token_endpoint(&server, 1).await;

        Mock::given(http_method("GET"))
            .and(url_path("/api/v1/health"))
            .respond_with(move |request: &Request| {
                if request.headers.contains_key(USER_EMAIL_HEADER) {
                    ResponseTemplate::new(500).set_body_string("unexpected user header")
                } else {
                    ResponseTemplate::new(200)
                }
            })
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = oauth_dispatcher(&server.uri());
        let response = dispatcher.get("/api/v1/health", None).await.unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn api_key_fallback_skips_token_endpoints() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(url_path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(http_method("GET"))
            .and(url_path("/api/v1/health"))
            .and(header("authorization", "token key-1:secret-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = Dispatcher::new(
            reqwest::Client::new(),
            server.uri(),
            Arc::new(ApiKeyStrategy::new("key-1", "secret-1")),
            Duration::from_secs(5),
        );
        let response = dispatcher.get("/api/v1/health", None).await.unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn from_config_assembles_a_working_dispatcher() {
        use crate::config::{ApiConfig, ApiKeyConfig, ClientConfig, FrappeConfig};
        use common::SecretString;

        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(url_path("/api/v1/health"))
            .and(header("authorization", "token key-1:secret-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = ClientConfig {
            frappe: FrappeConfig {
                base_url: server.uri(),
            },
            api: ApiConfig {
                base_url: server.uri(),
                timeout_secs: 5,
            },
            oauth: None,
            api_key: Some(ApiKeyConfig {
                key: "key-1".into(),
                secret: Some(SecretString::from("secret-1")),
                secret_file: None,
            }),
        };

        let dispatcher = Dispatcher::from_config(&config).unwrap();
        let response = dispatcher.get("/api/v1/health", None).await.unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn unreachable_resource_server_is_network_error() {
        let dispatcher = Dispatcher::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            Arc::new(ApiKeyStrategy::new("k", "s")),
            Duration::from_secs(2),
        );
        let err = dispatcher.get("/api/v1/health", None).await.unwrap_err();
        assert!(matches!(err, Error::Network { .. }), "got {err:?}");
    }
}
