use crate::audio::AudioChunk;
use crate::entitlement::{ChargeDescriptor, PaymentOutcome};
use crate::protocol::TranslationArtifact;
use crate::transport::{Connection, TransportEvent};

use super::state::SessionState;

/// Request from the UI layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Start { identity: String, target_lang: String },
    Stop,
    SetTargetLang(String),
    /// Reopen the payment flow after a cancellation
    RetryPayment,
}

/// Update pushed to the UI layer
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotification {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    Transcript {
        text: String,
    },
    Translation {
        text: String,
        artifact: TranslationArtifact,
    },
    PaymentRequired {
        charge: ChargeDescriptor,
    },
    /// `fatal` errors are reported exactly once, after resources are released
    Error {
        message: String,
        fatal: bool,
    },
}

/// Everything the session reacts to, processed one at a time
pub enum SessionEvent {
    Command(SessionCommand),
    /// Connect attempt finished
    Connected(anyhow::Result<Connection>),
    Transport(TransportEvent),
    /// Transport event stream ended without a close event
    TransportLost,
    Chunk(AudioChunk),
    /// Capture source stopped producing on its own
    CaptureEnded,
    /// Queued step: acquire capture after authentication
    BeginStreaming,
    PaymentResolved(PaymentOutcome),
    AuthTimedOut,
}

impl SessionEvent {
    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::Command(_) => "command",
            SessionEvent::Connected(_) => "connected",
            SessionEvent::Transport(_) => "transport",
            SessionEvent::TransportLost => "transport_lost",
            SessionEvent::Chunk(_) => "chunk",
            SessionEvent::CaptureEnded => "capture_ended",
            SessionEvent::BeginStreaming => "begin_streaming",
            SessionEvent::PaymentResolved(_) => "payment_resolved",
            SessionEvent::AuthTimedOut => "auth_timed_out",
        }
    }
}
