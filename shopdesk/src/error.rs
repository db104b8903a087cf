use crate::identifiers::Identity;

/// Failures surfaced by the session client and the storefront operations.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No credential record on file; the identity has to log in first.
    #[error("identity {0} is not authorized, login required")]
    NotAuthorized(Identity),

    /// Backend answered a login with 200 but left out one of the token cookies.
    #[error("backend accepted the login but did not return {0}")]
    MissingCredentials(&'static str),

    /// Access token was rejected and could not be refreshed (or was rejected again after a
    /// refresh).
    #[error("authorization for identity {0} has expired, login required")]
    AuthExpired(Identity),

    #[error("backend returned HTTP {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Backend answered a write with 200, but reported in the body that it did not apply it.
    #[error("backend rejected the change: {0}")]
    Rejected(String),

    #[error("could not render notification: {0}")]
    Render(#[from] askama::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl ApiError {
    /// True when the caller should prompt for a fresh login rather than retry.
    pub fn requires_login(&self) -> bool {
        matches!(self, ApiError::NotAuthorized(_) | ApiError::AuthExpired(_))
    }
}

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

#[test]
fn test_requires_login() {
    assert!(ApiError::NotAuthorized(Identity(1)).requires_login());
    assert!(ApiError::AuthExpired(Identity(1)).requires_login());
    assert!(!ApiError::MissingCredentials("refresh_token").requires_login());
    assert!(!ApiError::Backend {
        status: 502,
        body: "bad gateway".to_string()
    }
    .requires_login());
}
