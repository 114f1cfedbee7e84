//! Popup-based assertion login.
//!
//! `check_login` opens a popup pointed at the assertion endpoint with a
//! one-time callback id in the query string. Whatever hosts the popup hands
//! the result back through [`PopupAssertionStrategy::complete`]. Only one
//! attempt is in flight at a time; a concurrent attempt focuses the open
//! popup and waits for the same result.

use crate::error::AuthResult;
use crate::state::{Credentials, SessionState};
use crate::strategy::{AuthStrategy, ResponseCheck, StrategyOutcome};
use crate::transport::{HttpResponse, RequestConfig};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

const AUTH_TYPE: &str = "popup-assertion";

/// Default time to wait for the popup to report back (2 minutes).
pub const DEFAULT_POPUP_TIMEOUT_SECS: u64 = 120;

const FIELD_ASSERTION: &str = "assertion";

/// The window the assertion flow runs in.
pub trait PopupWindow: Send + Sync {
    fn open(&self, url: &str) -> AuthResult<()>;
    fn focus(&self);
    fn close(&self);
}

/// What the popup reports when it is done.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionPayload {
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub assertion: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl AssertionPayload {
    fn into_outcome(self) -> StrategyOutcome {
        if !self.approved {
            return StrategyOutcome::Denied(
                self.message.unwrap_or_else(|| "Login denied".to_string()),
            );
        }
        match self.assertion {
            Some(assertion) => {
                let mut state = SessionState::new().with_field(FIELD_ASSERTION, assertion);
                if let Some(user) = self.user {
                    state = state.with_user(user);
                }
                StrategyOutcome::Accepted(state)
            }
            None => StrategyOutcome::Error("Login approved without an assertion".to_string()),
        }
    }
}

struct PendingLogin {
    callback_id: String,
    result: watch::Sender<Option<StrategyOutcome>>,
}

/// Authenticates through a third-party assertion endpoint shown in a popup.
pub struct PopupAssertionStrategy {
    endpoint: Url,
    popup: Arc<dyn PopupWindow>,
    timeout: Duration,
    pending: Mutex<Option<PendingLogin>>,
}

impl PopupAssertionStrategy {
    pub fn new(endpoint: &str, popup: Arc<dyn PopupWindow>) -> AuthResult<Self> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
            popup,
            timeout: Duration::from_secs(DEFAULT_POPUP_TIMEOUT_SECS),
            pending: Mutex::new(None),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Callback id of the attempt in flight.
    pub fn pending_callback_id(&self) -> Option<String> {
        self.pending
            .lock()
            .as_ref()
            .map(|pending| pending.callback_id.clone())
    }

    /// Deliver the popup's result. Returns false if `callback_id` does not
    /// belong to the attempt in flight.
    pub fn complete(&self, callback_id: &str, payload: AssertionPayload) -> bool {
        let delivered = self.finish(callback_id, payload.into_outcome());
        if !delivered {
            warn!(callback_id, "Ignoring popup result for unknown login attempt");
        }
        delivered
    }

    fn login_url(&self, callback_id: &str) -> String {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("callback", callback_id);
        url.to_string()
    }

    /// Resolve the attempt identified by `callback_id` and close its popup.
    fn finish(&self, callback_id: &str, outcome: StrategyOutcome) -> bool {
        let pending = {
            let mut slot = self.pending.lock();
            match slot.as_ref() {
                Some(pending) if pending.callback_id == callback_id => slot.take(),
                _ => None,
            }
        };

        match pending {
            Some(pending) => {
                self.popup.close();
                pending.result.send_replace(Some(outcome));
                true
            }
            None => false,
        }
    }

    /// Join the attempt in flight, or open the popup for a new one.
    fn begin(&self) -> Result<(String, watch::Receiver<Option<StrategyOutcome>>), StrategyOutcome> {
        let mut slot = self.pending.lock();

        if let Some(pending) = slot.as_ref() {
            debug!("Login already in flight, focusing popup");
            self.popup.focus();
            return Ok((pending.callback_id.clone(), pending.result.subscribe()));
        }

        let callback_id = Uuid::new_v4().to_string();
        if let Err(e) = self.popup.open(&self.login_url(&callback_id)) {
            warn!(error = %e, "Failed to open login popup");
            return Err(StrategyOutcome::Error(format!(
                "Unable to open login window: {}",
                e
            )));
        }

        let (result, receiver) = watch::channel(None);
        *slot = Some(PendingLogin {
            callback_id: callback_id.clone(),
            result,
        });
        info!(callback_id = %callback_id, "Opened login popup");
        Ok((callback_id, receiver))
    }
}

#[async_trait]
impl AuthStrategy for PopupAssertionStrategy {
    fn auth_type(&self) -> &str {
        AUTH_TYPE
    }

    async fn check_login(&self, _credentials: &Credentials) -> StrategyOutcome {
        let (callback_id, mut receiver) = match self.begin() {
            Ok(joined) => joined,
            Err(outcome) => return outcome,
        };

        let waited = tokio::time::timeout(self.timeout, receiver.wait_for(Option::is_some))
            .await
            .map(|result| result.map(|resolved| (*resolved).clone()));
        match waited {
            Ok(Ok(resolved)) => resolved
                .unwrap_or_else(|| StrategyOutcome::Error("Login cancelled".to_string())),
            Ok(Err(_)) => StrategyOutcome::Error("Login cancelled".to_string()),
            Err(_) => {
                let timed_out = StrategyOutcome::Error("Login timed out".to_string());
                if self.finish(&callback_id, timed_out) {
                    warn!(callback_id = %callback_id, "Login popup timed out");
                }
                let resolved = receiver.borrow().clone();
                resolved.unwrap_or_else(|| StrategyOutcome::Error("Login timed out".to_string()))
            }
        }
    }

    fn cancel_login(&self) {
        let pending = self.pending.lock().take();
        if let Some(pending) = pending {
            info!(callback_id = %pending.callback_id, "Cancelling popup login");
            self.popup.close();
            pending
                .result
                .send_replace(Some(StrategyOutcome::Error("Login cancelled".to_string())));
        }
    }

    async fn refresh_login(&self, state: &SessionState) -> StrategyOutcome {
        StrategyOutcome::Accepted(state.clone())
    }

    fn check_response(&self, response: &HttpResponse) -> ResponseCheck {
        ResponseCheck {
            auth_failure: matches!(response.status, 401 | 403),
        }
    }

    fn add_auth_to_request_config(&self, config: &mut RequestConfig, state: &SessionState) {
        if let Some(assertion) = state.field_str(FIELD_ASSERTION) {
            config
                .headers
                .insert("Authorization".to_string(), format!("Bearer {}", assertion));
        }
    }
}
