//! Propagated end-user identity
//!
//! A trusted service account may forward the end user it is acting for, so
//! the resource server can attribute the action without that user
//! authenticating directly. The context rides on a single request as
//! `X-Frappe-User-*` headers and is never cached or reused.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::warn;

pub const USER_ID_HEADER: &str = "x-frappe-user-id";
pub const USER_EMAIL_HEADER: &str = "x-frappe-user-email";
pub const USER_NAME_HEADER: &str = "x-frappe-user-name";

/// End-user identity attached to one outbound call.
#[derive(Debug, Clone, Default)]
pub struct UserContext {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl UserContext {
    /// Context for a user known only by email. The email doubles as the
    /// Frappe user id, which is the common deployment convention.
    pub fn from_email(email: impl Into<String>) -> Self {
        let email = email.into();
        Self {
            user_id: Some(email.clone()),
            email: Some(email),
            display_name: None,
        }
    }

    /// Add one header per populated field; absent fields add nothing.
    pub fn apply(&self, headers: &mut HeaderMap) {
        insert(headers, USER_ID_HEADER, self.user_id.as_deref());
        insert(headers, USER_EMAIL_HEADER, self.email.as_deref());
        insert(headers, USER_NAME_HEADER, self.display_name.as_deref());
    }
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: Option<&str>) {
    let Some(value) = value else { return };
    match HeaderValue::from_str(value) {
        Ok(parsed) => {
            headers.insert(HeaderName::from_static(name), parsed);
        }
        Err(e) => warn!(header = name, error = %e, "skipping user header with invalid value"),
    }
}
