use thiserror::Error;

/// Failures a translation session can report
///
/// None of these escape the session as a panic or a returned error from the
/// event loop: they are turned into a state (`Error`) plus a notification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Capture device denied, absent, or already consumed
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// Connection refused, dropped, or a send failed
    #[error("transport error: {0}")]
    Transport(String),

    /// Server sent something we could not decode
    #[error("protocol decode error: {0}")]
    ProtocolDecode(String),

    /// Explicit `error` message from the service
    #[error("server error: {0}")]
    Server(String),

    /// No `auth_success` within the configured window
    #[error("authentication timed out after {0} ms")]
    AuthTimeout(u64),

    #[error("invalid start request: {0}")]
    InvalidStart(String),

    #[error("session is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, SessionError>;
