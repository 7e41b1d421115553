use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a translation session
///
/// ```text
/// Idle -> Connecting -> Authenticating -> Streaming <-> PaymentHeld
///                                                         \-> Closed
/// (any non-terminal) -> Error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Authenticating,
    Streaming,
    PaymentHeld,
    Closed,
    Error,
}

impl SessionState {
    /// No further events are processed in this state without a new `start`
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Error)
    }

    /// Target-language changes are forwarded to the service
    pub fn accepts_config(self) -> bool {
        matches!(
            self,
            SessionState::Authenticating | SessionState::Streaming | SessionState::PaymentHeld
        )
    }

    /// `payment_required` suspends the session from here
    pub fn can_hold_for_payment(self) -> bool {
        matches!(self, SessionState::Authenticating | SessionState::Streaming)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Authenticating => "authenticating",
            SessionState::Streaming => "streaming",
            SessionState::PaymentHeld => "payment_held",
            SessionState::Closed => "closed",
            SessionState::Error => "error",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
