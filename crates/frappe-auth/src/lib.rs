//! OAuth2 token acquisition for Frappe-based resource servers
//!
//! Implements the two grant flows a backend service needs to call a Frappe
//! deployment without embedding long-lived API keys:
//!
//! 1. Client credentials (machine-to-machine): `ClientCredentialsProvider`
//!    consults the shared `TokenCache`, fetches on a miss, and collapses
//!    concurrent misses for the same credential set into one upstream fetch.
//! 2. Authorization code (user-delegated): `AuthorizationCodeFlow` drives
//!    session login, the authorization request, an optional consent
//!    approval round, and the code-for-token exchange. The resulting token
//!    is bound to one user session and bypasses the shared cache.
//!
//! The provider never retries on its own. Reacting to a rejected bearer
//! token (invalidate the cache, fetch once more) belongs to the dispatch
//! layer in `frappe-client`.

pub mod authorization_code;
pub mod cache;
pub mod client_credentials;
pub mod constants;
pub mod endpoints;
pub mod error;
pub mod token;
pub mod userinfo;

pub use authorization_code::{AuthorizationCodeFlow, LoginCredentials};
pub use cache::TokenCache;
pub use client_credentials::ClientCredentialsProvider;
pub use endpoints::Endpoints;
pub use error::{Error, Result};
pub use token::{ClientCredentials, TokenRecord, TokenResponse};
pub use userinfo::{UserClaims, fetch_userinfo};
