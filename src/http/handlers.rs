use super::state::AppState;
use crate::entitlement::PendingPayment;
use crate::session::{SessionState, SessionStats};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    /// User identity sent with `auth`
    pub identity: String,

    /// Language to translate into (e.g. "yo", "ha", "ig")
    pub target_lang: String,
}

#[derive(Debug, Deserialize)]
pub struct SetLanguageRequest {
    pub target_lang: String,
}

#[derive(Debug, Deserialize)]
pub struct CompletePaymentRequest {
    /// Reference returned by the payment provider
    pub reference: String,
}

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    /// Overrides the generated file name
    pub filename: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub state: SessionState,
    pub transcript: Option<String>,
    pub translation: Option<String>,
    pub has_audio: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PendingPaymentResponse {
    pub pending: Option<PendingPayment>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn accepted(status: &str, message: impl Into<String>) -> Response {
    (
        StatusCode::ACCEPTED,
        Json(CommandResponse {
            status: status.to_string(),
            message: message.into(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /session/start
/// Start (or restart) the session for a user
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> Response {
    if req.identity.trim().is_empty() || req.target_lang.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "identity and target_lang are required",
        );
    }

    if state.handle.state() == SessionState::Closed {
        return error_response(StatusCode::CONFLICT, "Session is closed");
    }

    info!("Starting session for {} ({})", req.identity, req.target_lang);

    match state.handle.start(req.identity, req.target_lang).await {
        Ok(()) => accepted("starting", "Session start requested"),
        Err(e) => {
            error!("Failed to start session: {:#}", e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, format!("{:#}", e))
        }
    }
}

/// POST /session/stop
/// Stop the session and release the microphone and connection
pub async fn stop_session(State(state): State<AppState>) -> Response {
    info!("Stopping session");

    match state.handle.stop().await {
        Ok(()) => accepted("stopping", "Session stop requested"),
        // Session task already gone: nothing left to stop
        Err(_) => accepted("stopped", "Session already stopped"),
    }
}

/// PUT /session/language
/// Change the target language
pub async fn set_language(
    State(state): State<AppState>,
    Json(req): Json<SetLanguageRequest>,
) -> Response {
    if req.target_lang.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "target_lang is required");
    }

    match state.handle.set_target_lang(req.target_lang.clone()).await {
        Ok(()) => accepted("updated", format!("Target language set to {}", req.target_lang)),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, format!("{:#}", e)),
    }
}

/// GET /session/status
/// Current state and counters
pub async fn get_status(State(state): State<AppState>) -> Json<SessionStats> {
    Json(state.handle.stats())
}

/// GET /session/transcript
/// Latest transcript and translation text
pub async fn get_transcript(State(state): State<AppState>) -> Json<TranscriptResponse> {
    let view = state.view.read().await;

    Json(TranscriptResponse {
        state: state.handle.state(),
        transcript: view.transcript.clone(),
        translation: view.translation.clone(),
        has_audio: view.artifact.is_some(),
        last_error: view.last_error.clone(),
    })
}

/// GET /session/translation/audio
/// Download the latest translated audio
pub async fn download_translation(
    State(state): State<AppState>,
    Query(params): Query<DownloadParams>,
) -> Response {
    let view = state.view.read().await;

    let Some(artifact) = view.artifact.as_ref() else {
        return error_response(StatusCode::NOT_FOUND, "No translation audio yet");
    };

    let extension = artifact.extension();
    let filename = params
        .filename
        .as_deref()
        .and_then(|requested| download_name(requested, extension))
        .unwrap_or_else(|| {
            let received = view.artifact_received_at.unwrap_or_else(Utc::now);
            format!(
                "femseek-translation-{}.{}",
                received.timestamp_millis(),
                extension
            )
        });

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, artifact.mime_type.clone()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        artifact.bytes.clone(),
    )
        .into_response()
}

/// GET /payment/pending
/// Payment request waiting for checkout, if any
pub async fn get_pending_payment(State(state): State<AppState>) -> Json<PendingPaymentResponse> {
    Json(PendingPaymentResponse {
        pending: state.payments.pending(),
    })
}

/// POST /payment/complete
/// Checkout succeeded
pub async fn complete_payment(
    State(state): State<AppState>,
    Json(req): Json<CompletePaymentRequest>,
) -> Response {
    if req.reference.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "reference is required");
    }

    if state.payments.complete(req.reference.clone()) {
        info!("Payment completed by UI (reference {})", req.reference);
        accepted("completed", "Payment reference forwarded")
    } else {
        warn!("Payment completion with nothing pending");
        error_response(StatusCode::CONFLICT, "No payment pending")
    }
}

/// POST /payment/cancel
/// Checkout abandoned
pub async fn cancel_payment(State(state): State<AppState>) -> Response {
    if state.payments.cancel() {
        accepted("cancelled", "Payment cancelled")
    } else {
        error_response(StatusCode::CONFLICT, "No payment pending")
    }
}

/// POST /payment/retry
/// Reopen checkout after a cancellation
pub async fn retry_payment(State(state): State<AppState>) -> Response {
    if state.handle.state() != SessionState::PaymentHeld {
        return error_response(StatusCode::CONFLICT, "Session is not waiting for payment");
    }

    match state.handle.retry_payment().await {
        Ok(()) => accepted("retrying", "Payment flow reopened"),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, format!("{:#}", e)),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Caller-supplied download name, safe to quote in `Content-Disposition`
///
/// Quotes, backslashes and control characters are dropped and the artifact's
/// extension is appended when missing. `None` if nothing usable is left.
fn download_name(requested: &str, extension: &str) -> Option<String> {
    let name: String = requested
        .chars()
        .filter(|c| !matches!(c, '"' | '\\') && !c.is_control())
        .collect();
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let suffix = format!(".{}", extension);
    if name.to_ascii_lowercase().ends_with(&suffix) {
        Some(name.to_string())
    } else {
        Some(format!("{}{}", name, suffix))
    }
}
