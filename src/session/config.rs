use serde::{Deserialize, Serialize};
use std::time::Duration;

/// When audio capture starts after the connection opens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPolicy {
    /// Right after `auth` is sent; `auth_success` is informational
    #[default]
    Immediate,
    /// Only once the service answers `auth_success`
    AwaitAuthSuccess,
}

/// Reaction to an explicit `error` message from the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerErrorPolicy {
    /// Report it and stop capture, keep the connection
    #[default]
    HaltCapture,
    /// Fail the session
    Fatal,
}

/// Configuration for a translation session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier used in logs
    pub session_id: String,

    /// Translation service endpoint (ws:// or wss://)
    pub endpoint_url: String,

    /// Interval between audio chunks
    /// Default: 1 second
    pub cadence: Duration,

    pub start_policy: StartPolicy,

    /// Only used with `StartPolicy::AwaitAuthSuccess`
    pub auth_timeout: Option<Duration>,

    /// Payment flows still open after this are treated as cancelled
    pub payment_timeout: Option<Duration>,

    pub server_error_policy: ServerErrorPolicy,

    /// Queued control commands
    pub command_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            endpoint_url: "ws://127.0.0.1:8000/ws/translate/".to_string(),
            cadence: Duration::from_millis(1000),
            start_policy: StartPolicy::Immediate,
            auth_timeout: None,
            payment_timeout: None,
            server_error_policy: ServerErrorPolicy::HaltCapture,
            command_capacity: 32,
        }
    }
}
