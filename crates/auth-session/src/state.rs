//! Session state and login credentials.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Credential bundle held while logged in.
///
/// Everything in `fields` belongs to the strategy that produced it. The
/// session itself only reads `user` and `refresh_delay_millis`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Identity of the logged-in user, if the strategy knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Delay before the session should refresh this credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_delay_millis: Option<u64>,
    /// Strategy-owned credential fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_refresh_delay(mut self, delay_millis: u64) -> Self {
        self.refresh_delay_millis = Some(delay_millis);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// A string-valued field, if present.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

/// What the user typed into the login form.
///
/// Strategies that authenticate out of band (a popup) ignore both fields.
#[derive(Clone, Default)]
pub struct Credentials {
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn password(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            password: Some(password.into()),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
