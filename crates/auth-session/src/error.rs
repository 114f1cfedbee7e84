//! Authentication error types.

use crate::transport::HttpResponse;
use thiserror::Error;

/// Authentication error type.
///
/// Denied logins and unreachable token endpoints are not errors: they come
/// back as [`crate::LoginOutcome`] values. This type covers what the caller
/// cannot handle by showing a message on a login form.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Transport failure reported by a non-reqwest transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] session_storage::StorageError),

    /// Operation requires a logged-in session. Calling it while logged out
    /// is a programming error.
    #[error("Not logged in")]
    NotLoggedIn,

    /// Invalid state transition in the session FSM
    #[error("Invalid auth state transition: {0}")]
    InvalidStateTransition(String),

    /// A protected endpoint rejected the held credential. The session has
    /// already been reset; the rejected response is kept so the caller can
    /// retry the request after logging in again.
    #[error("Authentication rejected by server (HTTP {})", .0.status)]
    AuthFailure(Box<HttpResponse>),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors include:
    /// - Transport failures, connection errors and timeouts
    /// - HTTP errors with 5xx status codes
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Transport(_) => true,
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            _ => false,
        }
    }

    /// The rejected response carried by an [`AuthError::AuthFailure`].
    pub fn rejected_response(&self) -> Option<&HttpResponse> {
        match self {
            AuthError::AuthFailure(response) => Some(response),
            _ => None,
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RequestConfig;

    #[test]
    fn test_is_transient_transport() {
        assert!(AuthError::Transport("connection reset".to_string()).is_transient());
    }

    #[test]
    fn test_is_not_transient_storage() {
        let err =
            AuthError::Storage(session_storage::StorageError::Backend("disk full".to_string()));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_is_not_transient_not_logged_in() {
        assert!(!AuthError::NotLoggedIn.is_transient());
    }

    #[test]
    fn test_auth_failure_keeps_response() {
        let response = HttpResponse::new(401, "", RequestConfig::get("http://example.com/items"));
        let err = AuthError::AuthFailure(Box::new(response));

        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "Authentication rejected by server (HTTP 401)");
        assert_eq!(err.rejected_response().unwrap().config.url, "http://example.com/items");
    }
}
