//! Translation session management
//!
//! This module provides the `TranslationSession` state machine that manages:
//! - The connection to the translation service and its authentication
//! - Audio capture and chunk forwarding while streaming
//! - Suspension and resumption around payment
//! - Notifications to the UI and session statistics

mod config;
mod events;
mod handle;
mod session;
mod state;
mod stats;

pub use config::{ServerErrorPolicy, SessionConfig, StartPolicy};
pub use events::{SessionCommand, SessionEvent, SessionNotification};
pub use handle::SessionHandle;
pub use session::{SessionDeps, TranslationSession};
pub use state::SessionState;
pub use stats::{SessionCounters, SessionStats};
