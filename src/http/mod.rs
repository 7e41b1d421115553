//! HTTP API server for external control (the translation UI)
//!
//! This module provides a REST API for driving the session:
//! - POST /session/start - Start translating for a user
//! - POST /session/stop - Stop the session
//! - PUT /session/language - Change the target language
//! - GET /session/status - Query state and statistics
//! - GET /session/transcript - Latest transcript and translation text
//! - GET /session/translation/audio - Download the latest translated audio
//! - GET /payment/pending - Payment request waiting for checkout
//! - POST /payment/complete, /payment/cancel, /payment/retry - Checkout results
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::{AppState, SessionView};
