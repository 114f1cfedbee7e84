//! Keeps registered request templates in sync with the session credential.
//!
//! Each tracked template keeps its pristine copy. Redecorating always
//! restores the pristine copy first and then applies the current decoration,
//! so a credential from an earlier login can never linger in a template.

use crate::state::SessionState;
use crate::strategy::AuthStrategy;
use crate::transport::RequestConfig;
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared handle to a live request template.
///
/// The session rewrites the template whenever its state changes; holders
/// always see the current decoration.
#[derive(Debug, Clone)]
pub struct ManagedRequest {
    live: Arc<Mutex<RequestConfig>>,
}

impl ManagedRequest {
    fn new(config: RequestConfig) -> Self {
        Self {
            live: Arc::new(Mutex::new(config)),
        }
    }

    /// Copy of the template as currently decorated.
    pub fn snapshot(&self) -> RequestConfig {
        self.live.lock().clone()
    }

    fn replace(&self, config: RequestConfig) {
        *self.live.lock() = config;
    }
}

/// What a session applies to each template.
pub struct Decoration<'a> {
    /// Storage key of the owning session.
    pub session_key: &'a str,
    /// Strategy and state when logged in.
    pub auth: Option<(&'a dyn AuthStrategy, &'a SessionState)>,
}

impl Decoration<'_> {
    /// Apply the session tag and, when logged in, the credential.
    pub fn apply(&self, config: &mut RequestConfig) {
        config.session_key = Some(self.session_key.to_string());
        if let Some((strategy, state)) = self.auth {
            strategy.add_auth_to_request_config(config, state);
        }
    }

    /// A pristine copy of `template` with this decoration applied.
    pub fn decorated(&self, template: &RequestConfig) -> RequestConfig {
        let mut config = template.clone();
        self.apply(&mut config);
        config
    }
}

struct TrackedRequest {
    live: ManagedRequest,
    pristine: RequestConfig,
}

/// Every template registered with a session.
#[derive(Default)]
pub struct RequestConfigRegistry {
    tracked: Vec<TrackedRequest>,
}

impl RequestConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `template` and decorate it immediately.
    pub fn track(
        &mut self,
        template: RequestConfig,
        decoration: &Decoration<'_>,
    ) -> ManagedRequest {
        let live = ManagedRequest::new(decoration.decorated(&template));
        self.tracked.push(TrackedRequest {
            live: live.clone(),
            pristine: template,
        });
        live
    }

    /// Restore every template to its pristine copy and reapply `decoration`.
    pub fn redecorate_all(&self, decoration: &Decoration<'_>) {
        for tracked in &self.tracked {
            tracked.live.replace(decoration.decorated(&tracked.pristine));
        }
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }
}
