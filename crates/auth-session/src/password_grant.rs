//! OAuth2 resource-owner password grant.

use crate::state::{Credentials, SessionState};
use crate::strategy::{AuthStrategy, ResponseCheck, StrategyOutcome};
use crate::transport::{HttpResponse, HttpTransport, RequestConfig};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Token endpoint, relative to the host.
pub const TOKEN_PATH: &str = "/oauth/v2/token";

const AUTH_TYPE: &str = "password-oauth";

const FIELD_ACCESS_TOKEN: &str = "access_token";
const FIELD_REFRESH_TOKEN: &str = "refresh_token";
const FIELD_ACCESS_TOKEN_EXPIRES: &str = "access_token_expires";

/// Token endpoint response. Every field is optional because error responses
/// share the same shape.
#[derive(Debug, Default, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Exchanges a username and password for an access token and a refresh token.
pub struct PasswordGrantStrategy {
    transport: Arc<dyn HttpTransport>,
    host: String,
    client_id: String,
    client_secret: String,
}

impl PasswordGrantStrategy {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        host: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        let host: String = host.into();
        Self {
            transport,
            host: host.trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn token_url(&self) -> String {
        format!("{}{}", self.host, TOKEN_PATH)
    }

    /// Form body for a grant, client credentials first.
    fn token_form(&self, grant: &[(&str, &str)]) -> String {
        let mut form = url::form_urlencoded::Serializer::new(String::new());
        form.append_pair("client_id", &self.client_id);
        form.append_pair("client_secret", &self.client_secret);
        for (name, value) in grant {
            form.append_pair(name, value);
        }
        form.finish()
    }

    /// POST a grant to the token endpoint. `None` means no response arrived.
    async fn request_token(&self, grant: &[(&str, &str)]) -> Option<(u16, TokenResponse)> {
        let request = RequestConfig::post(self.token_url())
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body(self.token_form(grant));

        match self.transport.send(&request).await {
            Ok(response) => {
                debug!(status = response.status, "Token endpoint responded");
                let body = response.json::<TokenResponse>().unwrap_or_default();
                Some((response.status, body))
            }
            Err(e) => {
                warn!(error = %e, "Token endpoint unreachable");
                None
            }
        }
    }

    /// Map a token endpoint reply to an outcome. `previous_refresh` is carried
    /// forward when the server does not issue a new refresh token.
    fn interpret(
        &self,
        reply: Option<(u16, TokenResponse)>,
        user: Option<&str>,
        previous_refresh: Option<&str>,
    ) -> StrategyOutcome {
        let Some((status, body)) = reply else {
            return StrategyOutcome::Error("Unable to connect to authentication server".to_string());
        };

        if status == 200 {
            if let Some(access_token) = body.access_token {
                let refresh_token = body
                    .refresh_token
                    .or_else(|| previous_refresh.map(str::to_string));
                return StrategyOutcome::Accepted(issued_state(
                    user,
                    access_token,
                    refresh_token,
                    body.expires_in,
                ));
            }
        }

        if status == 400 && body.error.as_deref() == Some("invalid_grant") {
            return StrategyOutcome::Denied("Invalid username or password".to_string());
        }

        match body.error_description {
            Some(description) => StrategyOutcome::Error(format!("OAuth:{}", description)),
            None => StrategyOutcome::Error(format!("HTTP Status {}", status)),
        }
    }
}

fn issued_state(
    user: Option<&str>,
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
) -> SessionState {
    let mut state = SessionState::new().with_field(FIELD_ACCESS_TOKEN, access_token);
    if let Some(user) = user {
        state = state.with_user(user);
    }
    match expires_in.and_then(expiry_after) {
        Some(expires_at) => {
            state = state.with_field(FIELD_ACCESS_TOKEN_EXPIRES, expires_at.to_rfc3339());
        }
        None if expires_in.is_some() => {
            warn!(expires_in = ?expires_in, "Token lifetime out of range, expiry not recorded");
        }
        None => {}
    }
    if let Some(refresh_token) = refresh_token {
        state = state.with_field(FIELD_REFRESH_TOKEN, refresh_token);
        // Refresh halfway through the token lifetime
        if let Some(expires_in) = expires_in {
            state = state.with_refresh_delay(expires_in.saturating_mul(1000) / 2);
        }
    }
    state
}

/// Absolute expiry `expires_in` seconds from now, or `None` when it does not fit.
fn expiry_after(expires_in: u64) -> Option<DateTime<Utc>> {
    let seconds = i64::try_from(expires_in).ok()?;
    Utc::now().checked_add_signed(ChronoDuration::try_seconds(seconds)?)
}

#[async_trait]
impl AuthStrategy for PasswordGrantStrategy {
    fn auth_type(&self) -> &str {
        AUTH_TYPE
    }

    async fn check_login(&self, credentials: &Credentials) -> StrategyOutcome {
        let user = credentials.user.as_deref().unwrap_or_default();
        let password = credentials.password.as_deref().unwrap_or_default();
        info!(user = %user, "Requesting password grant");

        let reply = self
            .request_token(&[
                ("grant_type", "password"),
                ("username", user),
                ("password", password),
            ])
            .await;
        self.interpret(reply, credentials.user.as_deref(), None)
    }

    async fn refresh_login(&self, state: &SessionState) -> StrategyOutcome {
        let Some(refresh_token) = state.field_str(FIELD_REFRESH_TOKEN) else {
            return StrategyOutcome::Denied("No refresh token available".to_string());
        };

        let reply = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await;
        self.interpret(reply, None, Some(refresh_token))
    }

    fn check_response(&self, response: &HttpResponse) -> ResponseCheck {
        ResponseCheck {
            auth_failure: response.status == 401,
        }
    }

    fn add_auth_to_request_config(&self, config: &mut RequestConfig, state: &SessionState) {
        if let Some(token) = state.field_str(FIELD_ACCESS_TOKEN) {
            config
                .headers
                .insert("Authorization".to_string(), format!("Bearer {}", token));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::harness::MockTransport;

    fn strategy(transport: &Arc<MockTransport>) -> PasswordGrantStrategy {
        PasswordGrantStrategy::new(transport.clone(), "http://auth.local/", "app", "s3cret")
    }

    #[tokio::test]
    async fn test_login_accepted() {
        let transport = MockTransport::new();
        transport.respond(
            200,
            r#"{"access_token":"T1","refresh_token":"R1","expires_in":3600}"#,
        );
        let strategy = strategy(&transport);

        let outcome = strategy
            .check_login(&Credentials::password("alice", "p&ss word"))
            .await;

        let StrategyOutcome::Accepted(state) = outcome else {
            panic!("expected accepted, got {:?}", outcome);
        };
        assert_eq!(state.user.as_deref(), Some("alice"));
        assert_eq!(state.field_str("access_token"), Some("T1"));
        assert_eq!(state.field_str("refresh_token"), Some("R1"));
        assert_eq!(state.refresh_delay_millis, Some(1_800_000));
        assert!(state.field_str("access_token_expires").is_some());

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "http://auth.local/oauth/v2/token");
        assert_eq!(
            requests[0].header("Content-Type"),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(
            requests[0].body.as_deref(),
            Some(
                "client_id=app&client_secret=s3cret&grant_type=password\
                 &username=alice&password=p%26ss+word"
            )
        );
    }

    #[tokio::test]
    async fn test_no_refresh_delay_without_refresh_token() {
        let transport = MockTransport::new();
        transport.respond(200, r#"{"access_token":"T1","expires_in":3600}"#);

        let outcome = strategy(&transport)
            .check_login(&Credentials::password("alice", "pw"))
            .await;

        let StrategyOutcome::Accepted(state) = outcome else {
            panic!("expected accepted, got {:?}", outcome);
        };
        assert!(state.refresh_delay_millis.is_none());
        assert!(state.field_str("refresh_token").is_none());
    }

    #[tokio::test]
    async fn test_grants_run_on_spawned_tasks() {
        let transport = MockTransport::new();
        transport.respond(200, r#"{"access_token":"T1","refresh_token":"R1"}"#);
        transport.respond(200, r#"{"access_token":"T2"}"#);
        let strategy = Arc::new(strategy(&transport));

        let login = tokio::spawn({
            let strategy = strategy.clone();
            async move { strategy.check_login(&Credentials::password("alice", "pw")).await }
        });
        let StrategyOutcome::Accepted(state) = login.await.unwrap() else {
            panic!("expected accepted login");
        };

        let refresh = tokio::spawn(async move { strategy.refresh_login(&state).await });
        let StrategyOutcome::Accepted(refreshed) = refresh.await.unwrap() else {
            panic!("expected accepted refresh");
        };
        assert_eq!(refreshed.field_str("access_token"), Some("T2"));
        assert_eq!(refreshed.field_str("refresh_token"), Some("R1"));
    }

    #[tokio::test]
    async fn test_out_of_range_lifetime_skips_expiry() {
        let transport = MockTransport::new();
        transport.respond(
            200,
            r#"{"access_token":"T1","refresh_token":"R1","expires_in":10000000000000}"#,
        );
        transport.respond(
            200,
            r#"{"access_token":"T2","refresh_token":"R2","expires_in":18446744073709551615}"#,
        );
        let strategy = strategy(&transport);
        let credentials = Credentials::password("alice", "pw");

        for expected_token in ["T1", "T2"] {
            let outcome = strategy.check_login(&credentials).await;
            let StrategyOutcome::Accepted(state) = outcome else {
                panic!("expected accepted, got {:?}", outcome);
            };
            assert_eq!(state.field_str("access_token"), Some(expected_token));
            assert!(state.field_str("access_token_expires").is_none());
            assert!(state.refresh_delay_millis.is_some());
        }
    }

    #[tokio::test]
    async fn test_invalid_grant_is_denied() {
        let transport = MockTransport::new();
        transport.respond(400, r#"{"error":"invalid_grant","error_description":"bad"}"#);

        let outcome = strategy(&transport)
            .check_login(&Credentials::password("alice", "wrong"))
            .await;
        assert_eq!(
            outcome,
            StrategyOutcome::Denied("Invalid username or password".to_string())
        );
    }

    #[tokio::test]
    async fn test_error_messages() {
        let transport = MockTransport::new();
        transport.respond(
            400,
            r#"{"error":"invalid_client","error_description":"Unknown client"}"#,
        );
        transport.respond(503, "Service Unavailable");
        transport.fail("connection refused");
        let strategy = strategy(&transport);
        let credentials = Credentials::password("alice", "pw");

        assert_eq!(
            strategy.check_login(&credentials).await,
            StrategyOutcome::Error("OAuth:Unknown client".to_string())
        );
        assert_eq!(
            strategy.check_login(&credentials).await,
            StrategyOutcome::Error("HTTP Status 503".to_string())
        );
        assert_eq!(
            strategy.check_login(&credentials).await,
            StrategyOutcome::Error("Unable to connect to authentication server".to_string())
        );
    }

    #[tokio::test]
    async fn test_refresh_carries_refresh_token_forward() {
        let transport = MockTransport::new();
        transport.respond(200, r#"{"access_token":"T2","expires_in":600}"#);
        let state = SessionState::new()
            .with_user("alice")
            .with_field("access_token", "T1")
            .with_field("refresh_token", "R1");

        let outcome = strategy(&transport).refresh_login(&state).await;

        let StrategyOutcome::Accepted(refreshed) = outcome else {
            panic!("expected accepted, got {:?}", outcome);
        };
        assert_eq!(refreshed.field_str("access_token"), Some("T2"));
        assert_eq!(refreshed.field_str("refresh_token"), Some("R1"));
        assert_eq!(refreshed.refresh_delay_millis, Some(300_000));

        let body = transport.requests()[0].body.clone().unwrap_or_default();
        assert!(body.contains("grant_type=refresh_token"));
        assert!(body.contains("refresh_token=R1"));
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_is_denied() {
        let transport = MockTransport::new();
        let state = SessionState::new().with_field("access_token", "T1");

        let outcome = strategy(&transport).refresh_login(&state).await;

        assert!(matches!(outcome, StrategyOutcome::Denied(_)));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_bearer_header_and_failure_predicate() {
        let transport = MockTransport::new();
        let strategy = strategy(&transport);
        let state = SessionState::new().with_field("access_token", "T1");
        let mut config = RequestConfig::get("http://api.local/items");

        strategy.add_auth_to_request_config(&mut config, &state);
        assert_eq!(config.header("Authorization"), Some("Bearer T1"));

        let rejected = HttpResponse::new(401, "", config.clone());
        let forbidden = HttpResponse::new(403, "", config);
        assert!(strategy.check_response(&rejected).auth_failure);
        assert!(!strategy.check_response(&forbidden).auth_failure);
    }
}
