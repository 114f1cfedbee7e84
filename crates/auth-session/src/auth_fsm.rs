//! Session state machine using rust-fsm.
//!
//! An in-flight login or refresh does not change the observed state; only a
//! resolved result or a reset does.
//!
//! ## State Diagram
//!
//! ```text
//!                 Restored / LoginAccepted
//! ┌─────────────────┐ ───────────────────► ┌─────────────────┐
//! │    LoggedOut    │                      │    LoggedIn     │ ◄─┐ LoginAccepted /
//! │    (initial)    │ ◄─────────────────── │                 │ ──┘ RefreshAccepted
//! └─────────────────┘        Reset         └─────────────────┘
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(LoggedOut)

    LoggedOut => {
        // Persisted state found at construction
        Restored => LoggedIn,
        LoginAccepted => LoggedIn,
        Reset => LoggedOut
    },
    LoggedIn => {
        LoginAccepted => LoggedIn,
        RefreshAccepted => LoggedIn,
        Reset => LoggedOut
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Externally visible authentication state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// No session state held.
    LoggedOut,
    /// A complete credential bundle is held.
    LoggedIn,
}

impl AuthState {
    /// Returns true if a credential is held.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::LoggedIn)
    }
}

impl From<&SessionMachineState> for AuthState {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::LoggedOut => AuthState::LoggedOut,
            SessionMachineState::LoggedIn => AuthState::LoggedIn,
        }
    }
}

/// Retry behavior for timer-driven refreshes that fail with an error.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Maximum number of attempts, including the first.
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

impl RefreshConfig {
    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .initial_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let capped_ms = delay_ms.min(self.max_delay_ms);
        Duration::from_millis(capped_ms)
    }
}

/// Payload for auth state change events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStateChangedPayload {
    /// Current auth state.
    pub state: AuthState,
    /// User name if logged in and known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}
