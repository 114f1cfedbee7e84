//! Request template decoration.

use super::harness::{accepted, TestHarness};
use crate::RequestConfig;
use session_config_and_utils::AuthSessionConfig;

fn items() -> RequestConfig {
    RequestConfig::get("http://api.local/items").with_header("Accept", "application/json")
}

fn pristine_with_tag(template: RequestConfig, key: &str) -> RequestConfig {
    let mut expected = template;
    expected.session_key = Some(key.to_string());
    expected
}

#[tokio::test]
async fn test_session_tag_attached_while_logged_out() {
    let h = TestHarness::new();

    let managed = h.session.manage_request_config(items());

    let live = managed.snapshot();
    assert_eq!(live.session_key.as_deref(), Some("angular-mockAuth"));
    assert_eq!(live.header("Authorization"), None);
}

#[tokio::test]
async fn test_registered_templates_gain_and_lose_credential() {
    let h = TestHarness::new();
    let first = h.session.manage_request_config(items());
    let second = h
        .session
        .manage_request_config(RequestConfig::post("http://api.local/orders"));

    h.login_with(accepted("T1", None)).await;

    assert_eq!(first.snapshot().header("Authorization"), Some("Bearer T1"));
    assert_eq!(second.snapshot().header("Authorization"), Some("Bearer T1"));

    h.session.reset();

    assert_eq!(first.snapshot().header("Authorization"), None);
    assert_eq!(second.snapshot().header("Authorization"), None);
}

#[tokio::test]
async fn test_reset_restores_pristine_template_plus_tag() {
    let h = TestHarness::new();
    let managed = h.session.manage_request_config(items());

    h.login_with(accepted("T1", None)).await;
    h.login_with(accepted("T2", None)).await;
    h.session.reset();

    assert_eq!(
        managed.snapshot(),
        pristine_with_tag(items(), "angular-mockAuth")
    );
}

#[tokio::test]
async fn test_template_registered_after_login_is_decorated_immediately() {
    let h = TestHarness::new();
    h.login_with(accepted("T1", None)).await;

    let managed = h.session.manage_request_config(items());

    let live = managed.snapshot();
    assert_eq!(live.header("Authorization"), Some("Bearer T1"));
    assert_eq!(live.header("Accept"), Some("application/json"));
    assert_eq!(live.session_key.as_deref(), Some("angular-mockAuth"));
}

#[tokio::test]
async fn test_relogin_replaces_credential() {
    let h = TestHarness::new();
    let managed = h.session.manage_request_config(items());

    h.login_with(accepted("T1", None)).await;
    h.login_with(accepted("T2", None)).await;

    let mut expected = pristine_with_tag(items(), "angular-mockAuth");
    expected
        .headers
        .insert("Authorization".to_string(), "Bearer T2".to_string());
    assert_eq!(managed.snapshot(), expected);
}

#[tokio::test]
async fn test_tag_follows_session_name() {
    let h = TestHarness::with_config(AuthSessionConfig::default().with_session_name("foo"));

    let managed = h.session.manage_request_config(items());

    assert_eq!(
        managed.snapshot().session_key.as_deref(),
        Some("foo-mockAuth")
    );
}
