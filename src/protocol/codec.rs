use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use super::artifact::TranslationArtifact;
use super::messages::{ClientMessage, ServerMessage, SERVER_TAGS};
use crate::error::SessionError;

/// Server message that failed to decode
#[derive(Debug, Error)]
pub enum ProtocolDecodeError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("message has no string `type` field")]
    MissingType,

    #[error("invalid `{tag}` message: {source}")]
    InvalidFields {
        tag: String,
        source: serde_json::Error,
    },

    #[error("invalid base64 audio: {0}")]
    InvalidAudio(#[from] base64::DecodeError),
}

impl From<ProtocolDecodeError> for SessionError {
    fn from(err: ProtocolDecodeError) -> Self {
        SessionError::ProtocolDecode(err.to_string())
    }
}

/// Wire-level naming differences between service deployments
///
/// Deployments of the service disagree on a couple of names (the web client
/// authenticated with an `email` field, for instance). Rather than forking
/// the codec, those differences are configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolDialect {
    /// Field carrying the user identity in `auth`
    #[serde(default = "default_identity_field")]
    pub identity_field: String,

    /// Canonical tag -> tag used on the wire
    #[serde(default)]
    pub message_types: HashMap<String, String>,
}

fn default_identity_field() -> String {
    "identity".to_string()
}

impl Default for ProtocolDialect {
    fn default() -> Self {
        Self {
            identity_field: default_identity_field(),
            message_types: HashMap::new(),
        }
    }
}

impl ProtocolDialect {
    fn wire_tag<'a>(&'a self, canonical: &'a str) -> &'a str {
        self.message_types
            .get(canonical)
            .map(String::as_str)
            .unwrap_or(canonical)
    }

    fn canonical_tag(&self, wire: &str) -> String {
        self.message_types
            .iter()
            .find(|(_, renamed)| renamed.as_str() == wire)
            .map(|(canonical, _)| canonical.clone())
            .unwrap_or_else(|| wire.to_string())
    }
}

/// A decoded server message, ready for dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    TranscriptionUpdate { text: String },
    TranslationResult {
        text: String,
        artifact: TranslationArtifact,
    },
    PaymentRequired,
    AuthSuccess,
    ServerError { message: String },
    /// Well-formed message with a tag we do not know
    Ignored { tag: String },
}

/// Encodes client control messages and decodes server messages
#[derive(Debug, Clone)]
pub struct ProtocolCodec {
    dialect: ProtocolDialect,
    artifact_mime: String,
}

impl Default for ProtocolCodec {
    fn default() -> Self {
        Self::new(ProtocolDialect::default())
    }
}

impl ProtocolCodec {
    pub fn new(dialect: ProtocolDialect) -> Self {
        Self {
            dialect,
            artifact_mime: TranslationArtifact::DEFAULT_MIME.to_string(),
        }
    }

    /// Override the MIME type stamped on decoded translation audio
    pub fn with_artifact_mime(mut self, mime: impl Into<String>) -> Self {
        self.artifact_mime = mime.into();
        self
    }

    /// Encode a control message as a single JSON text payload
    pub fn encode(&self, message: &ClientMessage) -> serde_json::Result<String> {
        let mut value = serde_json::to_value(message)?;

        if let Value::Object(map) = &mut value {
            if matches!(message, ClientMessage::Auth { .. })
                && self.dialect.identity_field != "identity"
            {
                if let Some(identity) = map.remove("identity") {
                    map.insert(self.dialect.identity_field.clone(), identity);
                }
            }

            let tag = self.dialect.wire_tag(message.tag()).to_string();
            map.insert("type".to_string(), Value::String(tag));
        }

        serde_json::to_string(&value)
    }

    /// Decode one text payload received from the service
    ///
    /// Unknown tags are not an error: they come back as `Inbound::Ignored`.
    pub fn decode(&self, payload: &str) -> Result<Inbound, ProtocolDecodeError> {
        let mut value: Value = serde_json::from_str(payload)?;

        let tag = {
            let map = value.as_object_mut().ok_or(ProtocolDecodeError::NotAnObject)?;
            let wire_tag = map
                .get("type")
                .and_then(Value::as_str)
                .ok_or(ProtocolDecodeError::MissingType)?;

            let tag = self.dialect.canonical_tag(wire_tag);
            if !SERVER_TAGS.contains(&tag.as_str()) {
                return Ok(Inbound::Ignored {
                    tag: wire_tag.to_string(),
                });
            }

            map.insert("type".to_string(), Value::String(tag.clone()));
            tag
        };

        let message: ServerMessage = serde_json::from_value(value)
            .map_err(|source| ProtocolDecodeError::InvalidFields { tag, source })?;

        Ok(match message {
            ServerMessage::TranscriptionUpdate { text } => Inbound::TranscriptionUpdate { text },
            ServerMessage::TranslationResult { text, audio } => {
                let bytes = base64::engine::general_purpose::STANDARD.decode(audio.trim())?;
                Inbound::TranslationResult {
                    text,
                    artifact: TranslationArtifact::new(bytes, self.artifact_mime.clone()),
                }
            }
            ServerMessage::PaymentRequired {} => Inbound::PaymentRequired,
            ServerMessage::AuthSuccess {} => Inbound::AuthSuccess,
            ServerMessage::Error { message } => Inbound::ServerError { message },
        })
    }
}
