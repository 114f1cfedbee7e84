//! The auth session state machine.
//!
//! An [`AuthSession`] owns one strategy, the current [`SessionState`], and
//! every request template registered with it. Each install or reset of the
//! state redecorates all templates, persists (or removes) the state blob, and
//! re-arms (or cancels) the refresh timer.
//!
//! Login and refresh results are tagged with the attempt that produced them.
//! A result whose attempt was superseded (a newer login, a cancel, or a reset
//! happened meanwhile) is dropped instead of clobbering newer state.

use crate::auth_fsm::{
    AuthState, AuthStateChangedPayload, RefreshConfig, SessionMachine, SessionMachineInput,
};
use crate::navigation::Navigator;
use crate::refresh::RefreshScheduler;
use crate::request_config::{Decoration, ManagedRequest, RequestConfigRegistry};
use crate::state::{Credentials, SessionState};
use crate::strategy::{AuthStrategy, StrategyOutcome};
use crate::transport::{HttpResponse, HttpTransport, RequestConfig};
use crate::{AuthError, AuthResult};
use parking_lot::{Mutex, RwLock};
use session_config_and_utils::AuthSessionConfig;
use session_storage::{SessionStateStore, StateStorage};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Callback type for auth state change notifications.
pub type AuthStateCallback = Box<dyn Fn(AuthStateChangedPayload) + Send + Sync>;

type SharedStateCallback = Arc<dyn Fn(AuthStateChangedPayload) + Send + Sync>;
type AcceptedCallback = Box<dyn FnOnce() + Send>;
type MessageCallback = Box<dyn FnOnce(&str) + Send>;

/// How a login attempt resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Accepted,
    Denied(String),
    Error(String),
    /// A newer login, a cancel, or a reset happened while this attempt was in
    /// flight. Its result was discarded and no callback fired.
    Superseded,
}

/// How a refresh attempt resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed,
    Denied(String),
    Error(String),
    /// The session state changed while the refresh was in flight.
    Superseded,
}

/// Per-status callbacks for [`AuthSession::login_with_callbacks`].
#[derive(Default)]
pub struct LoginCallbacks {
    accepted: Option<AcceptedCallback>,
    denied: Option<MessageCallback>,
    error: Option<MessageCallback>,
}

impl LoginCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_accepted(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.accepted = Some(Box::new(callback));
        self
    }

    pub fn on_denied(mut self, callback: impl FnOnce(&str) + Send + 'static) -> Self {
        self.denied = Some(Box::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl FnOnce(&str) + Send + 'static) -> Self {
        self.error = Some(Box::new(callback));
        self
    }

    fn dispatch(self, outcome: &LoginOutcome) {
        match outcome {
            LoginOutcome::Accepted => {
                if let Some(callback) = self.accepted {
                    callback();
                }
            }
            LoginOutcome::Denied(message) => {
                if let Some(callback) = self.denied {
                    callback(message);
                }
            }
            LoginOutcome::Error(message) => {
                if let Some(callback) = self.error {
                    callback(message);
                }
            }
            LoginOutcome::Superseded => {}
        }
    }
}

/// Which attempt a strategy result belongs to.
#[derive(Debug, Clone, Copy)]
enum Attempt {
    Login(u64),
    Refresh(u64),
}

struct SessionInner {
    machine: SessionMachine,
    state: Option<SessionState>,
    /// Path recorded when an auth failure forced a redirect to the login path.
    prior_path: Option<String>,
    registry: RequestConfigRegistry,
    /// Bumped on every install and reset.
    generation: u64,
    /// Bumped on every login start, cancel and reset.
    login_seq: u64,
}

impl SessionInner {
    fn is_current(&self, attempt: Attempt) -> bool {
        match attempt {
            Attempt::Login(seq) => self.login_seq == seq,
            Attempt::Refresh(generation) => self.generation == generation,
        }
    }

    fn auth_state(&self) -> AuthState {
        AuthState::from(self.machine.state())
    }

    fn user(&self) -> Option<String> {
        self.state.as_ref().and_then(|state| state.user.clone())
    }

    fn transition(&mut self, input: &SessionMachineInput) -> AuthResult<(AuthState, AuthState)> {
        let old_state = self.auth_state();
        self.machine.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                self.machine.state()
            ))
        })?;
        let new_state = self.auth_state();

        debug!(
            old_state = ?old_state,
            new_state = ?new_state,
            input = ?input,
            "Auth state transition"
        );
        Ok((old_state, new_state))
    }
}

struct SessionShared {
    config: AuthSessionConfig,
    storage_key: String,
    strategy: Arc<dyn AuthStrategy>,
    store: SessionStateStore,
    navigator: Arc<dyn Navigator>,
    transport: Arc<dyn HttpTransport>,
    refresh_config: RefreshConfig,
    scheduler: RefreshScheduler,
    state_callback: RwLock<Option<SharedStateCallback>>,
    inner: Mutex<SessionInner>,
}

impl SessionShared {
    fn decoration<'a>(&'a self, state: Option<&'a SessionState>) -> Decoration<'a> {
        Decoration {
            session_key: &self.storage_key,
            auth: state.map(|state| (self.strategy.as_ref(), state)),
        }
    }
}

/// Result of installing a new state.
struct Installed {
    /// Generation the install produced. Follow-up effects are skipped once it
    /// is no longer current.
    generation: u64,
    changed: Option<AuthStateChangedPayload>,
    redirect: Option<String>,
}

/// Client-side authentication session.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct AuthSession {
    shared: Arc<SessionShared>,
}

impl AuthSession {
    /// Create a session and restore any persisted state.
    ///
    /// A restored state does not arm the refresh timer.
    pub fn new(
        strategy: Arc<dyn AuthStrategy>,
        storage: Arc<dyn StateStorage>,
        navigator: Arc<dyn Navigator>,
        transport: Arc<dyn HttpTransport>,
        config: AuthSessionConfig,
    ) -> Self {
        Self::with_refresh_config(
            strategy,
            storage,
            navigator,
            transport,
            config,
            RefreshConfig::default(),
        )
    }

    /// Create a session with custom retry behavior for scheduled refreshes.
    pub fn with_refresh_config(
        strategy: Arc<dyn AuthStrategy>,
        storage: Arc<dyn StateStorage>,
        navigator: Arc<dyn Navigator>,
        transport: Arc<dyn HttpTransport>,
        config: AuthSessionConfig,
        refresh_config: RefreshConfig,
    ) -> Self {
        let auth_type = strategy.auth_type().to_string();
        let storage_key = config.storage_key(&auth_type);
        let store = SessionStateStore::new(storage, &config.session_name, &auth_type);

        let restored = match store.get::<SessionState>() {
            Ok(restored) => restored,
            Err(e) => {
                warn!(key = %storage_key, error = %e, "Failed to read persisted session state");
                None
            }
        };

        let mut machine = SessionMachine::new();
        if restored.is_some() {
            if let Err(e) = machine.consume(&SessionMachineInput::Restored) {
                warn!(error = ?e, "Failed to restore session state");
            }
        } else if let Err(e) = store.remove() {
            warn!(key = %storage_key, error = %e, "Failed to clear persisted session state");
        }

        info!(
            key = %storage_key,
            restored = restored.is_some(),
            "Auth session created"
        );

        let inner = SessionInner {
            machine,
            state: restored,
            prior_path: None,
            registry: RequestConfigRegistry::new(),
            generation: 0,
            login_seq: 0,
        };

        Self {
            shared: Arc::new(SessionShared {
                config,
                storage_key,
                strategy,
                store,
                navigator,
                transport,
                refresh_config,
                scheduler: RefreshScheduler::new(),
                state_callback: RwLock::new(None),
                inner: Mutex::new(inner),
            }),
        }
    }

    /// Set a callback to be notified of auth state changes.
    pub fn set_state_callback(&self, callback: AuthStateCallback) {
        *self.shared.state_callback.write() = Some(Arc::from(callback));
    }

    pub fn config(&self) -> &AuthSessionConfig {
        &self.shared.config
    }

    pub fn auth_type(&self) -> &str {
        self.shared.strategy.auth_type()
    }

    /// Key of the persisted state, also the tag attached to every managed
    /// request.
    pub fn storage_key(&self) -> &str {
        &self.shared.storage_key
    }

    pub fn auth_state(&self) -> AuthState {
        self.shared.inner.lock().auth_state()
    }

    pub fn logged_in(&self) -> bool {
        self.auth_state().is_authenticated()
    }

    /// Identity of the logged-in user.
    pub fn user_name(&self) -> Option<String> {
        self.shared.inner.lock().user()
    }

    /// Copy of the current session state.
    pub fn state(&self) -> Option<SessionState> {
        self.shared.inner.lock().state.clone()
    }

    /// Whether a scheduled refresh is pending.
    pub fn refresh_armed(&self) -> bool {
        self.shared.scheduler.is_armed()
    }

    /// Attempt to log in. See [`AuthSession::login_with_callbacks`].
    pub async fn login(&self, credentials: Credentials) -> AuthResult<LoginOutcome> {
        self.login_with_callbacks(credentials, LoginCallbacks::default())
            .await
    }

    /// Attempt to log in and fire the callback matching the outcome.
    ///
    /// On acceptance the state is persisted and installed, every managed
    /// template is redecorated, the refresh timer is re-armed, and the
    /// navigator is sent to the path recorded at the last auth failure (or
    /// the default post-login path). Denied and error outcomes leave the
    /// state untouched.
    ///
    /// Returns `Err` only when the accepted state could not be persisted, in
    /// which case nothing was installed.
    pub async fn login_with_callbacks(
        &self,
        credentials: Credentials,
        callbacks: LoginCallbacks,
    ) -> AuthResult<LoginOutcome> {
        let attempt = {
            let mut inner = self.shared.inner.lock();
            inner.login_seq += 1;
            Attempt::Login(inner.login_seq)
        };
        info!(user = ?credentials.user, "Login started");

        let result = self.shared.strategy.check_login(&credentials).await;

        let outcome = match result {
            StrategyOutcome::Accepted(new_state) => {
                let installed = self.install(
                    attempt,
                    new_state,
                    credentials.user.clone(),
                    &SessionMachineInput::LoginAccepted,
                )?;
                match installed {
                    Some(installed) => {
                        info!(user = ?self.user_name(), "Login accepted");
                        callbacks.dispatch(&LoginOutcome::Accepted);
                        self.after_install(installed);
                        LoginOutcome::Accepted
                    }
                    None => LoginOutcome::Superseded,
                }
            }
            StrategyOutcome::Denied(message) => {
                self.unapplied_login_outcome(attempt, LoginOutcome::Denied(message), callbacks)
            }
            StrategyOutcome::Error(message) => {
                self.unapplied_login_outcome(attempt, LoginOutcome::Error(message), callbacks)
            }
        };

        if outcome == LoginOutcome::Superseded {
            debug!("Discarding result of superseded login");
        }
        Ok(outcome)
    }

    fn unapplied_login_outcome(
        &self,
        attempt: Attempt,
        outcome: LoginOutcome,
        callbacks: LoginCallbacks,
    ) -> LoginOutcome {
        if !self.shared.inner.lock().is_current(attempt) {
            return LoginOutcome::Superseded;
        }
        info!(outcome = ?outcome, "Login not accepted");
        callbacks.dispatch(&outcome);
        outcome
    }

    /// Abandon an in-flight login. Its result, if one still arrives, is
    /// discarded.
    pub fn cancel_login(&self) {
        self.shared.inner.lock().login_seq += 1;
        debug!("Cancelling login");
        self.shared.strategy.cancel_login();
    }

    /// Renew the credential through the strategy.
    ///
    /// Denied and error outcomes are logged and returned; the session is left
    /// as it is. Returns `Err(NotLoggedIn)` when called while logged out.
    pub async fn refresh_login(&self) -> AuthResult<RefreshOutcome> {
        let (attempt, current) = {
            let inner = self.shared.inner.lock();
            let current = inner.state.clone().ok_or(AuthError::NotLoggedIn)?;
            (Attempt::Refresh(inner.generation), current)
        };
        debug!("Refreshing login");

        let result = self.shared.strategy.refresh_login(&current).await;

        let outcome = match result {
            StrategyOutcome::Accepted(new_state) => {
                let installed = self.install(
                    attempt,
                    new_state,
                    None,
                    &SessionMachineInput::RefreshAccepted,
                )?;
                match installed {
                    Some(installed) => {
                        info!(user = ?self.user_name(), "Login refreshed");
                        self.after_install(installed);
                        RefreshOutcome::Refreshed
                    }
                    None => RefreshOutcome::Superseded,
                }
            }
            StrategyOutcome::Denied(message) => RefreshOutcome::Denied(message),
            StrategyOutcome::Error(message) => RefreshOutcome::Error(message),
        };

        match &outcome {
            RefreshOutcome::Denied(message) | RefreshOutcome::Error(message) => {
                if !self.shared.inner.lock().is_current(attempt) {
                    return Ok(RefreshOutcome::Superseded);
                }
                warn!(message = %message, "Refresh failed");
            }
            RefreshOutcome::Superseded => debug!("Discarding result of superseded refresh"),
            RefreshOutcome::Refreshed => {}
        }
        Ok(outcome)
    }

    /// Log out. Sends the logout request if one is configured, then resets
    /// and navigates to the login path. Does nothing while logged out.
    ///
    /// The logout request runs in the background; the returned handle may be
    /// awaited by callers that are about to exit.
    pub fn logout(&self) -> Option<JoinHandle<()>> {
        let logout_request = {
            let inner = self.shared.inner.lock();
            let Some(state) = inner.state.as_ref() else {
                debug!("Logout while logged out, ignoring");
                return None;
            };
            self.shared.config.logout_url.as_ref().map(|url| {
                self.shared
                    .decoration(Some(state))
                    .decorated(&RequestConfig::post(url.as_str()))
            })
        };

        info!(user = ?self.user_name(), "Logging out");
        let pending = logout_request.and_then(|request| self.send_logout(request));

        self.reset();
        self.shared
            .navigator
            .set_path(&self.shared.config.login_path, false);
        pending
    }

    fn send_logout(&self, request: RequestConfig) -> Option<JoinHandle<()>> {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No async runtime available, skipping logout request");
                return None;
            }
        };

        let transport = self.shared.transport.clone();
        Some(handle.spawn(async move {
            match transport.send(&request).await {
                Ok(response) => debug!(status = response.status, "Logout request completed"),
                Err(e) => warn!(error = %e, "Logout request failed"),
            }
        }))
    }

    /// Clear the state, cancel the refresh timer, strip credentials from
    /// every managed template, and remove the persisted blob.
    pub fn reset(&self) {
        let changed = {
            let mut guard = self.shared.inner.lock();
            let inner = &mut *guard;

            let changed = match inner.transition(&SessionMachineInput::Reset) {
                Ok((old_state, new_state)) => old_state != new_state,
                Err(e) => {
                    warn!(error = %e, "Unexpected reset failure");
                    false
                }
            };
            inner.state = None;
            inner.generation += 1;
            inner.login_seq += 1;
            inner.registry.redecorate_all(&self.shared.decoration(None));

            if let Err(e) = self.shared.store.remove() {
                warn!(
                    key = %self.shared.storage_key,
                    error = %e,
                    "Failed to remove persisted session state"
                );
            }
            self.shared.scheduler.cancel();
            changed
        };

        debug!(key = %self.shared.storage_key, "Session reset");

        if changed {
            self.notify_state_change(AuthStateChangedPayload {
                state: AuthState::LoggedOut,
                user: None,
            });
        }
    }

    /// Register a request template. The returned handle always reflects the
    /// current credential.
    pub fn manage_request_config(&self, template: RequestConfig) -> ManagedRequest {
        let mut guard = self.shared.inner.lock();
        let inner = &mut *guard;
        let decoration = self.shared.decoration(inner.state.as_ref());
        inner.registry.track(template, &decoration)
    }

    /// Inspect a response for an auth failure.
    ///
    /// A flagged response resets the session, redirects to the login path,
    /// and comes back as `Err(AuthFailure)` carrying the response. Anything
    /// else passes through unchanged.
    pub fn handle_response(&self, response: HttpResponse) -> AuthResult<HttpResponse> {
        if !self.shared.strategy.check_response(&response).auth_failure {
            return Ok(response);
        }

        warn!(
            status = response.status,
            url = %response.config.url,
            "Credential rejected by protected endpoint"
        );
        self.redirect_to_login();
        Err(AuthError::AuthFailure(Box::new(response)))
    }

    /// Remember where the user was, reset, and send them to the login path.
    fn redirect_to_login(&self) {
        let login_path = &self.shared.config.login_path;
        let current = self.shared.navigator.current_path();
        if &current != login_path {
            self.shared.inner.lock().prior_path = Some(current);
        }

        self.reset();
        self.shared.navigator.set_path(login_path, true);
    }

    /// Persist and install `new_state` if `attempt` is still current.
    fn install(
        &self,
        attempt: Attempt,
        mut new_state: SessionState,
        fallback_user: Option<String>,
        input: &SessionMachineInput,
    ) -> AuthResult<Option<Installed>> {
        let mut guard = self.shared.inner.lock();
        let inner = &mut *guard;

        if !inner.is_current(attempt) {
            return Ok(None);
        }

        if new_state.user.is_none() {
            new_state.user = fallback_user.or_else(|| inner.user());
        }

        self.shared.store.put(&new_state)?;
        let (old_state, new_auth_state) = inner.transition(input)?;

        let refresh_delay_millis = new_state.refresh_delay_millis;
        let user = new_state.user.clone();
        inner.state = Some(new_state);
        inner.generation += 1;
        inner
            .registry
            .redecorate_all(&self.shared.decoration(inner.state.as_ref()));

        // Armed under the lock; a reset always cancels it
        match refresh_delay_millis {
            Some(delay_millis) => self.arm_refresh(Duration::from_millis(delay_millis)),
            None => self.shared.scheduler.cancel(),
        }

        let redirect = match attempt {
            Attempt::Login(_) => Some(
                inner
                    .prior_path
                    .take()
                    .unwrap_or_else(|| self.shared.config.default_post_login_path.clone()),
            ),
            Attempt::Refresh(_) => None,
        };

        let changed = (old_state != new_auth_state).then_some(AuthStateChangedPayload {
            state: new_auth_state,
            user,
        });

        Ok(Some(Installed {
            generation: inner.generation,
            changed,
            redirect,
        }))
    }

    /// Notify and redirect for an install, unless another install or a reset
    /// has happened since.
    fn after_install(&self, installed: Installed) {
        if let Some(payload) = installed.changed {
            if !self.is_generation(installed.generation) {
                debug!("Session changed after install, skipping notification");
                return;
            }
            self.notify_state_change(payload);
        }
        if let Some(path) = installed.redirect {
            if !self.is_generation(installed.generation) {
                debug!("Session changed after install, skipping redirect");
                return;
            }
            self.shared.navigator.set_path(&path, true);
        }
    }

    fn is_generation(&self, generation: u64) -> bool {
        self.shared.inner.lock().generation == generation
    }

    fn arm_refresh(&self, delay: Duration) {
        let session: Weak<SessionShared> = Arc::downgrade(&self.shared);
        self.shared.scheduler.arm(delay, move || {
            let Some(shared) = session.upgrade() else {
                return;
            };
            let session = AuthSession { shared };
            tokio::spawn(async move {
                session.run_scheduled_refresh().await;
            });
        });
    }

    /// Timer-driven refresh. Error outcomes and transient errors are retried
    /// with backoff; a denial, any other error, or running out of attempts
    /// expires the session.
    async fn run_scheduled_refresh(&self) {
        let generation = {
            let inner = self.shared.inner.lock();
            if inner.state.is_none() {
                return;
            }
            inner.generation
        };
        let max_attempts = self.shared.refresh_config.max_retries.max(1);

        for attempt in 0..max_attempts {
            if !self.is_generation(generation) {
                debug!("Session changed, abandoning scheduled refresh");
                return;
            }

            match self.refresh_login().await {
                Ok(RefreshOutcome::Refreshed) | Ok(RefreshOutcome::Superseded) => return,
                Err(AuthError::NotLoggedIn) => return,
                Ok(RefreshOutcome::Denied(message)) => {
                    self.expire(generation, &message);
                    return;
                }
                Ok(RefreshOutcome::Error(message)) => {
                    warn!(attempt = attempt + 1, message = %message, "Scheduled refresh failed");
                }
                Err(e) if e.is_transient() => {
                    warn!(attempt = attempt + 1, error = %e, "Scheduled refresh failed");
                }
                Err(e) => {
                    self.expire(generation, &e.to_string());
                    return;
                }
            }

            if attempt + 1 < max_attempts {
                let delay = self.shared.refresh_config.delay_for_attempt(attempt);
                debug!(delay_ms = delay.as_millis() as u64, "Retrying refresh after delay");
                tokio::time::sleep(delay).await;
            }
        }

        self.expire(generation, "refresh attempts exhausted");
    }

    /// Treat a failed scheduled refresh like an auth failure, unless the
    /// session moved on meanwhile.
    fn expire(&self, generation: u64, reason: &str) {
        if !self.is_generation(generation) {
            return;
        }
        warn!(reason = %reason, "Session expired");
        self.redirect_to_login();
    }

    fn notify_state_change(&self, payload: AuthStateChangedPayload) {
        // The callback may replace itself, so it runs outside the lock
        let callback = self.shared.state_callback.read().clone();
        if let Some(callback) = callback {
            callback(payload);
        }
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("key", &self.shared.storage_key)
            .field("state", &self.auth_state())
            .finish_non_exhaustive()
    }
}
