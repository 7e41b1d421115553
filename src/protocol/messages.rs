use serde::{Deserialize, Serialize};

/// Control message sent from the client to the translation service
///
/// Audio is never wrapped in one of these: chunks travel as raw binary
/// frames on the same connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Sent once per connection, right after it opens
    Auth { identity: String, target_lang: String },

    /// Target language changed mid-session (best effort, no ack)
    Config { target_lang: String },

    /// Reference returned by the payment provider
    PaymentVerification { reference: String },
}

impl ClientMessage {
    /// Canonical wire tag for this variant
    pub fn tag(&self) -> &'static str {
        match self {
            ClientMessage::Auth { .. } => "auth",
            ClientMessage::Config { .. } => "config",
            ClientMessage::PaymentVerification { .. } => "payment_verification",
        }
    }
}

/// Control message pushed by the translation service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Interim transcription of what the user is saying
    TranscriptionUpdate { text: String },

    /// Final translation; `audio` is base64-encoded synthesized speech
    TranslationResult {
        #[serde(default)]
        text: String,
        audio: String,
    },

    /// Trial exhausted; streaming must stop until payment is confirmed
    PaymentRequired {},

    AuthSuccess {},

    Error { message: String },
}

/// Every server tag this client understands
pub const SERVER_TAGS: &[&str] = &[
    "transcription_update",
    "translation_result",
    "payment_required",
    "auth_success",
    "error",
];
