//! Authenticated client for Frappe-backed resource APIs
//!
//! Wires the grant flows from `frappe-auth` into an outbound request
//! dispatcher. The auth strategy is picked once, at configuration time:
//! OAuth2 client credentials when an OAuth client is configured, the
//! pre-shared API key scheme otherwise. `Dispatcher::dispatch` attaches
//! the credential, propagates optional end-user identity headers, and
//! absorbs a single 401 round trip by refreshing the credential.

pub mod config;
pub mod dispatcher;
pub mod strategy;
pub mod user;

pub use config::ClientConfig;
pub use dispatcher::Dispatcher;
pub use strategy::{
    ApiKeyStrategy, AuthStrategy, OAuth2Strategy, authorization_flow_from_config,
};
pub use user::UserContext;

pub use frappe_auth::{AuthorizationCodeFlow, Error, LoginCredentials, Result};
