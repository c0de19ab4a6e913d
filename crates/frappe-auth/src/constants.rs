//! Frappe OAuth endpoint defaults
//!
//! Method paths for the OAuth2 provider built into the Frappe framework.
//! They are stable across Frappe-based applications (ERPNext, HR,
//! Healthcare); deployments with a customized surface can override the
//! derived URLs on `Endpoints` field by field.

/// Session login (form body `usr`/`pwd`, sets the session cookie).
pub const LOGIN_PATH: &str = "/api/method/login";

/// Authorization endpoint for the code grant.
pub const AUTHORIZE_PATH: &str = "/api/method/frappe.integrations.oauth2.authorize";

/// Token endpoint for both grant types.
pub const TOKEN_PATH: &str = "/api/method/frappe.integrations.oauth2.get_token";

/// OpenID profile endpoint, used for optional bearer-token validation.
pub const USERINFO_PATH: &str = "/api/method/frappe.integrations.oauth2.openid_profile";

/// Placeholder redirect target. Nothing listens here; the authorization
/// code is read off the redirect's query string, never delivered.
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost";

/// Scopes requested during the authorization-code flow.
pub const DEFAULT_SCOPE: &str = "openid profile email all";

/// Assumed token lifetime when the token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Tokens are treated as expired this long before their real expiry to
/// absorb clock skew against the resource server.
pub const DEFAULT_EXPIRY_BUFFER_SECS: u64 = 60;
