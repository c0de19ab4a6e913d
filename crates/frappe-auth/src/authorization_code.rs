//! Interactive authorization-code flow
//!
//! Drives Frappe's code grant end to end without a browser:
//!
//! 1. Log in with username/password to establish a session cookie
//! 2. Request authorization; the redirect may already carry the code
//! 3. Otherwise submit the consent approval and re-inspect the redirect
//! 4. Exchange the code for a token
//!
//! Each invocation builds its own HTTP client with an isolated cookie jar,
//! so concurrent flows never share session state. Redirect following is
//! disabled throughout: the authorization code only ever appears in a
//! `Location` header that must be inspected, never followed.
//!
//! Any step failing is terminal for the invocation; callers restart from
//! the top. The resulting `TokenRecord` is bound to the logged-in user and
//! deliberately bypasses the shared service-token cache.

use std::time::Duration;

use reqwest::redirect::Policy;
use tracing::{debug, info};
use url::Url;

use common::SecretString;

use crate::constants::DEFAULT_SCOPE;
use crate::endpoints::Endpoints;
use crate::error::{Error, Result, body_excerpt};
use crate::token::{self, ClientCredentials, TokenRecord, unix_millis};

/// Consent pages observed against Frappe need at most one approval round.
/// The loop is bounded regardless, so a server that keeps re-rendering the
/// consent form cannot spin the flow forever.
const MAX_APPROVAL_ROUNDS: usize = 2;

const DEFAULT_FLOW_TIMEOUT: Duration = Duration::from_secs(30);

/// End-user identity used to authorize the OAuth client.
pub struct LoginCredentials {
    pub username: String,
    pub password: SecretString,
}

impl LoginCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<SecretString>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Where the authorization request landed, after following zero redirects.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AuthorizeOutcome {
    /// The redirect target's query carries `code=...`: consent granted.
    CodeGranted(String),
    /// The redirect points back at the authorization endpoint: consent has
    /// not been given yet and an approval round is required.
    ApprovalRequired,
    /// Anything else: non-redirect status, unparseable target, or a
    /// redirect that carries no code and is not the consent page.
    Unexpected(String),
}

/// Runs the four-step code grant for one user session.
pub struct AuthorizationCodeFlow {
    endpoints: Endpoints,
    credentials: ClientCredentials,
    scope: String,
    timeout: Duration,
}

impl AuthorizationCodeFlow {
    pub fn new(endpoints: Endpoints, credentials: ClientCredentials) -> Self {
        Self {
            endpoints,
            credentials,
            scope: DEFAULT_SCOPE.to_string(),
            timeout: DEFAULT_FLOW_TIMEOUT,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the full flow for `login`, returning a token bound to that user.
    pub async fn obtain_token(&self, login: &LoginCredentials) -> Result<TokenRecord> {
        let session = self.session_client()?;
        self.login(&session, login).await?;

        let mut outcome = self.request_authorization(&session).await?;
        let mut rounds = 0;
        let code = loop {
            match outcome {
                AuthorizeOutcome::CodeGranted(code) => break code,
                AuthorizeOutcome::ApprovalRequired if rounds < MAX_APPROVAL_ROUNDS => {
                    rounds += 1;
                    debug!(round = rounds, "consent approval required");
                    outcome = self.approve(&session).await?;
                }
                AuthorizeOutcome::ApprovalRequired => {
                    return Err(Error::ApprovalFailed(format!(
                        "consent still pending after {MAX_APPROVAL_ROUNDS} approval rounds"
                    )));
                }
                AuthorizeOutcome::Unexpected(detail) if rounds == 0 => {
                    return Err(Error::UnexpectedResponse {
                        step: "authorize",
                        detail,
                    });
                }
                AuthorizeOutcome::Unexpected(detail) => {
                    return Err(Error::ApprovalFailed(detail));
                }
            }
        };

        let response =
            token::exchange_code(&session, &self.endpoints, &self.credentials, &code).await?;
        let record = TokenRecord::from_response(response, unix_millis());
        info!(client_id = %self.credentials.client_id, "user token obtained");
        Ok(record)
    }

    /// Fresh client per invocation: private cookie jar, no redirect
    /// following, bounded timeout.
    fn session_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::Network {
                step: "session",
                detail: e.to_string(),
            })
    }

    async fn login(&self, session: &reqwest::Client, login: &LoginCredentials) -> Result<()> {
        let response = session
            .post(&self.endpoints.login_url)
            .form(&[
                ("usr", login.username.as_str()),
                ("pwd", login.password.expose()),
            ])
            .send()
            .await
            .map_err(|e| Error::Network {
                step: "login",
                detail: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(Error::LoginFailed {
                status: status.as_u16(),
                body: body_excerpt(&body),
            });
        }
        debug!(username = %login.username, "session established");
        Ok(())
    }

    fn authorize_params(&self) -> [(&'static str, &str); 4] {
        [
            ("client_id", self.credentials.client_id.as_str()),
            ("redirect_uri", self.endpoints.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", self.scope.as_str()),
        ]
    }

    async fn request_authorization(&self, session: &reqwest::Client) -> Result<AuthorizeOutcome> {
        let response = session
            .get(&self.endpoints.authorize_url)
            .query(&self.authorize_params())
            .send()
            .await
            .map_err(|e| Error::Network {
                step: "authorize",
                detail: e.to_string(),
            })?;
        Ok(classify_authorize_response(
            &response,
            &self.endpoints.authorize_url,
        ))
    }

    /// Re-submit the authorization parameters with the explicit approval
    /// flag Frappe's consent form posts.
    async fn approve(&self, session: &reqwest::Client) -> Result<AuthorizeOutcome> {
        let mut form = self.authorize_params().to_vec();
        form.push(("authorize", "1"));
        let response = session
            .post(&self.endpoints.authorize_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Network {
                step: "approve",
                detail: e.to_string(),
            })?;
        Ok(classify_authorize_response(
            &response,
            &self.endpoints.authorize_url,
        ))
    }
}

fn classify_authorize_response(
    response: &reqwest::Response,
    authorize_url: &str,
) -> AuthorizeOutcome {
    let status = response.status();
    if !status.is_redirection() {
        return AuthorizeOutcome::Unexpected(format!("expected redirect, got HTTP {status}"));
    }
    match response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
    {
        Some(location) => classify_redirect_target(location, authorize_url),
        None => AuthorizeOutcome::Unexpected(format!(
            "HTTP {status} redirect without a Location header"
        )),
    }
}

/// Structured inspection of a redirect target. The code, when present, is
/// lifted from the parsed query string; consent pending is recognized by
/// path, not substring.
fn classify_redirect_target(location: &str, authorize_url: &str) -> AuthorizeOutcome {
    let Some(target) = parse_location(location, authorize_url) else {
        return AuthorizeOutcome::Unexpected(format!("unparseable redirect target: {location}"));
    };

    if let Some((_, code)) = target.query_pairs().find(|(name, _)| name == "code") {
        if !code.is_empty() {
            return AuthorizeOutcome::CodeGranted(code.into_owned());
        }
    }

    let points_back_at_authorize = Url::parse(authorize_url)
        .ok()
        .is_some_and(|authorize| target.path() == authorize.path());
    if points_back_at_authorize {
        AuthorizeOutcome::ApprovalRequired
    } else {
        AuthorizeOutcome::Unexpected(format!(
            "redirect target carries no authorization code: {location}"
        ))
    }
}

/// `Location` may be absolute or server-relative.
fn parse_location(location: &str, base: &str) -> Option<Url> {
    Url::parse(location)
        .ok()
        .or_else(|| Url::parse(base).ok()?.join(location).ok())
}
