//! Observable progress of a login attempt.

use serde::Serialize;
use std::fmt;

/// Signing families go `Connecting → Preparing → Signing → Authenticating →
/// Delegating`; relaying signers go `Connecting → Calling → Verifying →
/// Delegating`. Both end in `Success` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum LoginState {
    Idle,
    Connecting,
    Preparing,
    Signing,
    Authenticating,
    Calling,
    Verifying,
    Delegating,
    Success,
    Error(String),
}

impl LoginState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoginState::Success | LoginState::Error(_))
    }
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginState::Idle => write!(f, "idle"),
            LoginState::Connecting => write!(f, "connecting"),
            LoginState::Preparing => write!(f, "preparing"),
            LoginState::Signing => write!(f, "signing"),
            LoginState::Authenticating => write!(f, "authenticating"),
            LoginState::Calling => write!(f, "calling"),
            LoginState::Verifying => write!(f, "verifying"),
            LoginState::Delegating => write!(f, "delegating"),
            LoginState::Success => write!(f, "success"),
            LoginState::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}
