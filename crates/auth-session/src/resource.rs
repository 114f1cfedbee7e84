//! CRUD wrapper over managed request templates.

use crate::request_config::ManagedRequest;
use crate::router::AuthenticatedClient;
use crate::session::AuthSession;
use crate::transport::{HttpResponse, Method, RequestConfig};
use crate::{AuthError, AuthResult};
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

fn default_actions() -> [(&'static str, Method); 5] {
    [
        ("get", Method::GET),
        ("save", Method::POST),
        ("query", Method::GET),
        ("remove", Method::DELETE),
        ("delete", Method::DELETE),
    ]
}

/// A REST resource whose requests always carry the session's credential.
pub struct SecureResource {
    base_url: String,
    session: AuthSession,
    client: AuthenticatedClient,
    actions: BTreeMap<String, ManagedRequest>,
}

impl SecureResource {
    /// Register the default actions (`get`, `save`, `query`, `remove`,
    /// `delete`) against `base_url`.
    pub fn new(
        session: &AuthSession,
        client: AuthenticatedClient,
        base_url: impl Into<String>,
    ) -> Self {
        let mut resource = Self {
            base_url: base_url.into(),
            session: session.clone(),
            client,
            actions: BTreeMap::new(),
        };
        for (name, method) in default_actions() {
            resource.register(name, method);
        }
        resource
    }

    /// Add or replace an action.
    pub fn with_action(mut self, name: impl Into<String>, method: Method) -> Self {
        self.register(name, method);
        self
    }

    fn register(&mut self, name: impl Into<String>, method: Method) {
        let template = RequestConfig::new(method, self.base_url.clone())
            .with_header("Accept", "application/json");
        let managed = self.session.manage_request_config(template);
        self.actions.insert(name.into(), managed);
    }

    pub fn action(&self, name: &str) -> Option<&ManagedRequest> {
        self.actions.get(name)
    }

    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    /// Issue `action`, optionally addressing one item by `id` and sending a
    /// JSON `body`.
    pub async fn call(
        &self,
        action: &str,
        id: Option<&str>,
        body: Option<&Value>,
    ) -> AuthResult<HttpResponse> {
        let managed = self
            .actions
            .get(action)
            .ok_or_else(|| AuthError::Config(format!("Unknown action: {}", action)))?;

        let mut config = managed.snapshot();
        if let Some(id) = id {
            config.url = item_url(&config.url, id)?;
        }
        if let Some(body) = body {
            config.body = Some(serde_json::to_string(body)?);
            config
                .headers
                .insert("Content-Type".to_string(), "application/json".to_string());
        }

        self.client.send_config(config).await
    }
}

/// Append `id` as a percent-encoded path segment.
fn item_url(base: &str, id: &str) -> AuthResult<String> {
    let mut url = Url::parse(base)?;
    url.path_segments_mut()
        .map_err(|_| AuthError::Config(format!("Cannot append an id to {}", base)))?
        .pop_if_empty()
        .push(id);
    Ok(url.to_string())
}
