//! Error taxonomy for token acquisition
//!
//! Callers branch on the variant to tell "fix your configuration" from
//! "transient network issue" from "the server rejected the credential"
//! without string-matching messages. Providers return these values across
//! component boundaries; nothing in this crate panics on a failed request.

use thiserror::Error;

/// Errors from token acquisition and authenticated dispatch.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or inconsistent credentials. No network call was made.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transport-level failure (DNS, connect, timeout).
    #[error("network error during {step}: {detail}")]
    Network { step: &'static str, detail: String },

    /// The identity endpoint rejected the username/password login.
    #[error("login failed: HTTP {status}: {body}")]
    LoginFailed { status: u16, body: String },

    /// The consent approval round did not yield an authorization code.
    #[error("authorization approval failed: {0}")]
    ApprovalFailed(String),

    /// The token endpoint refused to complete the code exchange.
    #[error("token exchange failed: HTTP {status}: {body}")]
    TokenExchangeFailed { status: u16, body: String },

    /// The server rejected the presented credential (401/403).
    #[error("authentication rejected: HTTP {status}: {body}")]
    Authentication { status: u16, body: String },

    /// A response did not match the protocol shape (bad redirect, bad JSON).
    #[error("unexpected response during {step}: {detail}")]
    UnexpectedResponse { step: &'static str, detail: String },
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Trim a response body for embedding in an error. Failure bodies can be
/// whole HTML error pages; keep enough to diagnose without flooding logs.
pub fn body_excerpt(body: &str) -> String {
    const MAX: usize = 256;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_status_and_body() {
        let err = Error::Authentication {
            status: 401,
            body: "invalid_token".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("401"), "got: {msg}");
        assert!(msg.contains("invalid_token"), "got: {msg}");
    }

    #[test]
    fn network_display_names_the_step() {
        let err = Error::Network {
            step: "login",
            detail: "connection refused".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("login"), "got: {msg}");
        assert!(msg.contains("connection refused"), "got: {msg}");
    }

    #[test]
    fn debug_includes_variant_name() {
        let err = Error::TokenExchangeFailed {
            status: 400,
            body: "bad code".into(),
        };
        let debug = format!("{err:?}");
        assert!(debug.contains("TokenExchangeFailed"), "got: {debug}");
    }

    #[test]
    fn short_bodies_pass_through() {
        assert_eq!(body_excerpt("server said no"), "server said no");
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(1000);
        let excerpt = body_excerpt(&body);
        assert_eq!(excerpt.len(), 256 + 3);
        assert!(excerpt.ends_with("..."));
    }

    #[test]
    fn truncation_respects_utf8_boundaries() {
        // 255 ASCII bytes followed by a multi-byte char spanning the cut
        let body = format!("{}ééééé", "x".repeat(255));
        let excerpt = body_excerpt(&body);
        assert!(excerpt.ends_with("..."));
        // must not have split inside the two-byte 'é'
        assert!(excerpt.is_char_boundary(excerpt.len() - 3));
    }
}
