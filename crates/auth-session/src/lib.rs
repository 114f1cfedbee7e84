//! Client-side authentication session management.
//!
//! This crate provides:
//! - [`AuthSession`], a two-state (logged out / logged in) session that
//!   persists its state, decorates outbound request templates with the
//!   current credential, and refreshes the credential on a timer
//! - The [`AuthStrategy`] trait with password-grant and popup-assertion
//!   implementations
//! - [`SessionRouter`] and [`AuthenticatedClient`] for routing responses back
//!   to the session that issued the request
//! - [`SecureResource`], a small CRUD wrapper over managed request templates

mod auth_fsm;
mod error;
mod navigation;
mod password_grant;
mod popup_assertion;
mod refresh;
mod request_config;
mod resource;
mod router;
mod session;
mod state;
mod strategy;
mod transport;

#[cfg(test)]
mod tests;

pub use auth_fsm::session_machine;
pub use auth_fsm::{
    AuthState, AuthStateChangedPayload, RefreshConfig, SessionMachine, SessionMachineInput,
    SessionMachineState,
};
pub use error::{AuthError, AuthResult};
pub use navigation::{MemoryNavigator, Navigator};
pub use password_grant::{PasswordGrantStrategy, TOKEN_PATH};
pub use popup_assertion::{AssertionPayload, PopupAssertionStrategy, PopupWindow};
pub use refresh::RefreshScheduler;
pub use request_config::{Decoration, ManagedRequest, RequestConfigRegistry};
pub use resource::SecureResource;
pub use router::{AuthenticatedClient, SessionRouter};
pub use session::{AuthSession, AuthStateCallback, LoginCallbacks, LoginOutcome, RefreshOutcome};
pub use state::{Credentials, SessionState};
pub use strategy::{AuthStrategy, ResponseCheck, StrategyOutcome};
pub use transport::{HttpResponse, HttpTransport, Method, RequestConfig, ReqwestTransport};

pub use session_config_and_utils::AuthSessionConfig;
