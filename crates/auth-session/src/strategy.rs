//! Pluggable authentication backends.

use crate::state::{Credentials, SessionState};
use crate::transport::{HttpResponse, RequestConfig};
use async_trait::async_trait;

/// Result of a login or refresh attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome {
    /// The server issued a credential.
    Accepted(SessionState),
    /// The server rejected the credentials. The message is fit for the user.
    Denied(String),
    /// The attempt could not be completed (unreachable server, protocol error).
    Error(String),
}

/// Verdict of [`AuthStrategy::check_response`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseCheck {
    /// The held credential is no longer valid.
    pub auth_failure: bool,
}

/// An authentication backend. One strategy is bound to a session for its
/// whole lifetime.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Stable identifier, used to namespace persisted state.
    fn auth_type(&self) -> &str;

    /// Attempt to authenticate.
    async fn check_login(&self, credentials: &Credentials) -> StrategyOutcome;

    /// Best-effort abort of an in-flight [`AuthStrategy::check_login`].
    fn cancel_login(&self) {}

    /// Renew the credential. Only called while logged in.
    async fn refresh_login(&self, state: &SessionState) -> StrategyOutcome;

    /// Whether a response means the held credential was rejected. Must not
    /// have side effects.
    fn check_response(&self, response: &HttpResponse) -> ResponseCheck;

    /// Attach the credential to a request. Applied to a freshly restored
    /// template every time, so it only needs to be correct once.
    fn add_auth_to_request_config(&self, config: &mut RequestConfig, state: &SessionState);
}
