//! Endpoint set consumed by the grant flows

use crate::constants::{
    AUTHORIZE_PATH, DEFAULT_REDIRECT_URI, LOGIN_PATH, TOKEN_PATH, USERINFO_PATH,
};

/// Absolute URLs for the identity provider's OAuth surface.
///
/// `frappe()` derives the standard method paths from a deployment base URL.
/// Fields are public so nonstandard deployments can override individual
/// endpoints after construction.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub login_url: String,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub redirect_uri: String,
}

impl Endpoints {
    /// Standard endpoint set for a Frappe deployment at `base_url`.
    pub fn frappe(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            login_url: format!("{base}{LOGIN_PATH}"),
            authorize_url: format!("{base}{AUTHORIZE_PATH}"),
            token_url: format!("{base}{TOKEN_PATH}"),
            userinfo_url: format!("{base}{USERINFO_PATH}"),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_standard_frappe_paths() {
        let endpoints = Endpoints::frappe("http://localhost:8000");
        assert_eq!(endpoints.login_url, "http://localhost:8000/api/method/login");
        assert_eq!(
            endpoints.authorize_url,
            "http://localhost:8000/api/method/frappe.integrations.oauth2.authorize"
        );
        assert_eq!(
            endpoints.token_url,
            "http://localhost:8000/api/method/frappe.integrations.oauth2.get_token"
        );
        assert_eq!(
            endpoints.userinfo_url,
            "http://localhost:8000/api/method/frappe.integrations.oauth2.openid_profile"
        );
        assert_eq!(endpoints.redirect_uri, "http://localhost");
    }

    #[test]
    fn trims_trailing_slash() {
        let endpoints = Endpoints::frappe("https://erp.example.com/");
        assert_eq!(
            endpoints.token_url,
            "https://erp.example.com/api/method/frappe.integrations.oauth2.get_token"
        );
    }
}
