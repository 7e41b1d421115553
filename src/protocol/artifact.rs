use serde::Serialize;

/// Synthesized translation audio handed to the UI
///
/// The session produces these and never keeps them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslationArtifact {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl TranslationArtifact {
    /// The service synthesizes MP3
    pub const DEFAULT_MIME: &'static str = "audio/mpeg";

    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File extension for saving this artifact
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "audio/mpeg" | "audio/mp3" => "mp3",
            "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
            "audio/ogg" => "ogg",
            "audio/webm" => "webm",
            _ => "bin",
        }
    }
}
