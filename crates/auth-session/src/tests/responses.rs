//! Auth failure handling and logout.

use super::harness::{accepted, settle, TestHarness};
use crate::{AuthError, HttpResponse, Method, RequestConfig};
use session_config_and_utils::AuthSessionConfig;

fn response(h: &TestHarness, status: u16) -> HttpResponse {
    let managed = h
        .session
        .manage_request_config(RequestConfig::get("http://api.local/items"));
    HttpResponse::new(status, r#"{"ok":true}"#, managed.snapshot())
}

#[tokio::test]
async fn test_non_failure_response_passes_through() {
    let h = TestHarness::new();
    h.login_with(accepted("T1", None)).await;
    h.go_to("/some/resource");
    let original = response(&h, 200);

    let passed = h.session.handle_response(original.clone()).unwrap();

    assert_eq!(passed, original);
    assert!(h.session.logged_in());
    assert_eq!(h.current_path(), "/some/resource");

    // Other errors are not auth failures either
    let server_error = response(&h, 500);
    assert_eq!(h.session.handle_response(server_error.clone()).unwrap(), server_error);
    assert!(h.session.logged_in());
}

#[tokio::test]
async fn test_auth_failure_resets_and_redirects() {
    let h = TestHarness::new();
    h.login_with(accepted("T1", None)).await;
    h.go_to("/some/resource");
    let rejected = response(&h, 401);

    let err = h.session.handle_response(rejected.clone()).unwrap_err();

    assert!(matches!(err, AuthError::AuthFailure(_)));
    assert_eq!(err.rejected_response(), Some(&rejected));
    assert!(!h.session.logged_in());
    assert!(h.storage.is_empty());
    assert_eq!(
        h.navigator.history().last(),
        Some(&("/login".to_string(), true))
    );
}

#[tokio::test]
async fn test_login_after_auth_failure_returns_to_prior_path() {
    let h = TestHarness::new();
    h.login_with(accepted("T1", None)).await;
    h.go_to("/some/resource");
    let _ = h.session.handle_response(response(&h, 401));

    h.login_with(accepted("T2", None)).await;
    assert_eq!(h.current_path(), "/some/resource");

    // The prior path is used once
    h.session.logout();
    h.login_with(accepted("T3", None)).await;
    assert_eq!(h.current_path(), "/");
}

#[tokio::test]
async fn test_auth_failure_on_login_page_records_nothing() {
    let h = TestHarness::new();
    h.go_to("/login");

    let _ = h.session.handle_response(response(&h, 401));
    h.login_with(accepted("T1", None)).await;

    assert_eq!(h.current_path(), "/");
}

#[tokio::test]
async fn test_auth_failure_uses_custom_login_path() {
    let h = TestHarness::with_config(AuthSessionConfig::default().with_login_path("/welcome"));
    h.login_with(accepted("T1", None)).await;

    let _ = h.session.handle_response(response(&h, 401));

    assert_eq!(h.current_path(), "/welcome");
}

#[tokio::test]
async fn test_logout_navigates_without_replace() {
    let h = TestHarness::new();
    h.login_with(accepted("T1", None)).await;

    h.session.logout();

    assert!(!h.session.logged_in());
    assert_eq!(
        h.navigator.history().last(),
        Some(&("/login".to_string(), false))
    );
    assert!(h.transport.requests().is_empty());
}

#[tokio::test]
async fn test_logout_while_logged_out_is_noop() {
    let h = TestHarness::with_config(
        AuthSessionConfig::default().with_logout_url("http://auth.local/logout"),
    );

    assert!(h.session.logout().is_none());
    settle().await;

    assert_eq!(h.navigator.history().len(), 1);
    assert!(h.transport.requests().is_empty());
}

#[tokio::test]
async fn test_logout_sends_decorated_request() {
    let h = TestHarness::with_config(
        AuthSessionConfig::default().with_logout_url("http://auth.local/logout"),
    );
    h.login_with(accepted("T1", None)).await;

    let pending = h.session.logout().expect("logout request spawned");
    pending.await.unwrap();

    let requests = h.transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(requests[0].url, "http://auth.local/logout");
    assert_eq!(requests[0].header("Authorization"), Some("Bearer T1"));
    assert_eq!(requests[0].session_key.as_deref(), Some("angular-mockAuth"));
    assert_eq!(h.current_path(), "/login");
}

#[tokio::test]
async fn test_failed_logout_request_still_logs_out() {
    let h = TestHarness::with_config(
        AuthSessionConfig::default().with_logout_url("http://auth.local/logout"),
    );
    h.login_with(accepted("T1", None)).await;
    h.transport.fail("connection refused");

    h.session.logout();
    settle().await;

    assert!(!h.session.logged_in());
    assert_eq!(h.transport.requests().len(), 1);
}
