//! Routes responses back to the session that decorated their request.

use crate::request_config::ManagedRequest;
use crate::session::AuthSession;
use crate::transport::{HttpResponse, HttpTransport, RequestConfig};
use crate::AuthResult;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Map from storage key to session, owned by whoever wires sessions to the
/// transport.
///
/// Entries are only ever added.
#[derive(Clone, Default)]
pub struct SessionRouter {
    sessions: Arc<RwLock<HashMap<String, AuthSession>>>,
}

impl SessionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under its storage key. A later session with the
    /// same key replaces the earlier one.
    pub fn register(&self, session: &AuthSession) {
        let key = session.storage_key().to_string();
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&key) {
            warn!(key = %key, "Replacing registered session");
        }
        debug!(key = %key, "Registering session");
        sessions.insert(key, session.clone());
    }

    pub fn session(&self, key: &str) -> Option<AuthSession> {
        self.sessions.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Pass a response through its owning session's inspection hook.
    ///
    /// Responses without a session tag, or tagged with an unknown key, pass
    /// through unchanged.
    pub fn intercept(&self, response: HttpResponse) -> AuthResult<HttpResponse> {
        let session = response
            .config
            .session_key
            .as_deref()
            .and_then(|key| self.session(key));

        match session {
            Some(session) => session.handle_response(response),
            None => Ok(response),
        }
    }
}

/// Sends requests and runs every response through a [`SessionRouter`].
#[derive(Clone)]
pub struct AuthenticatedClient {
    transport: Arc<dyn HttpTransport>,
    router: SessionRouter,
}

impl AuthenticatedClient {
    pub fn new(transport: Arc<dyn HttpTransport>, router: SessionRouter) -> Self {
        Self { transport, router }
    }

    pub fn router(&self) -> &SessionRouter {
        &self.router
    }

    /// Send a managed template as currently decorated.
    pub async fn send(&self, request: &ManagedRequest) -> AuthResult<HttpResponse> {
        self.send_config(request.snapshot()).await
    }

    pub async fn send_config(&self, config: RequestConfig) -> AuthResult<HttpResponse> {
        let response = self.transport.send(&config).await?;
        self.router.intercept(response)
    }
}
