// Integration tests for the HTTP control API

mod common;

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{server, test_config, Harness};
use femseek_client::http::{create_router, AppState};
use femseek_client::protocol::TranslationArtifact;
use femseek_client::session::{SessionNotification, SessionState};
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

async fn call(state: &AppState, method: &str, uri: &str, body: Option<Value>) -> Result<(StatusCode, Vec<u8>)> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))?,
        None => builder.body(Body::empty())?,
    };

    let response = create_router(state.clone()).oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;

    Ok((status, bytes.to_vec()))
}

async fn call_json(state: &AppState, method: &str, uri: &str, body: Option<Value>) -> Result<(StatusCode, Value)> {
    let (status, bytes) = call(state, method, uri, body).await?;
    Ok((status, serde_json::from_slice(&bytes)?))
}

/// Session running in the background, plus the API state around it
fn spawn_app() -> (AppState, Harness) {
    let h = Harness::new(test_config());
    let state = AppState::new(h.handle.clone(), h.payments.clone());
    (state, h)
}

#[tokio::test]
async fn test_health() -> Result<()> {
    let (state, _h) = spawn_app();

    let (status, body) = call(&state, "GET", "/health", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");

    Ok(())
}

#[tokio::test]
async fn test_start_requires_identity() -> Result<()> {
    let (state, _h) = spawn_app();

    let (status, body) = call_json(
        &state,
        "POST",
        "/session/start",
        Some(json!({"identity": " ", "target_lang": "yo"})),
    )
    .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("identity"));

    Ok(())
}

#[tokio::test]
async fn test_start_status_and_stop() -> Result<()> {
    let (state, h) = spawn_app();
    let mut handle = h.handle.clone();
    let task = tokio::spawn(h.session.run());

    let (status, body) = call_json(
        &state,
        "POST",
        "/session/start",
        Some(json!({"identity": "user@example.com", "target_lang": "yo"})),
    )
    .await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "starting");

    assert_eq!(handle.wait_for(SessionState::Streaming).await, SessionState::Streaming);

    let (status, stats) = call_json(&state, "GET", "/session/status", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["state"], "streaming");
    assert_eq!(stats["chunks_sent"], 0);

    let (status, _) = call_json(
        &state,
        "PUT",
        "/session/language",
        Some(json!({"target_lang": "ha"})),
    )
    .await?;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, _) = call_json(&state, "POST", "/session/stop", None).await?;
    assert_eq!(status, StatusCode::ACCEPTED);

    tokio::time::timeout(Duration::from_secs(2), task).await??;
    assert_eq!(handle.state(), SessionState::Closed);

    let messages = h.connector.latest().control_messages();
    assert_eq!(messages.last().unwrap()["type"], "config");
    assert_eq!(messages.last().unwrap()["target_lang"], "ha");

    Ok(())
}

#[tokio::test]
async fn test_transcript_and_audio_download() -> Result<()> {
    let (state, _h) = spawn_app();

    let (status, _) = call_json(&state, "GET", "/session/translation/audio", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    {
        let mut view = state.view.write().await;
        view.apply(SessionNotification::Transcript {
            text: "good morning".to_string(),
        });
        view.apply(SessionNotification::Translation {
            text: "e kaaro".to_string(),
            artifact: TranslationArtifact::new(vec![0xff, 0xfb, 0x90, 0x00], "audio/mpeg"),
        });
    }

    let (status, body) = call_json(&state, "GET", "/session/transcript", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transcript"], "good morning");
    assert_eq!(body["translation"], "e kaaro");
    assert_eq!(body["has_audio"], true);

    let request = Request::builder()
        .uri("/session/translation/audio")
        .body(Body::empty())?;
    let response = create_router(state.clone()).oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");

    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str()?.to_string();
    assert!(disposition.starts_with("attachment; filename=\"femseek-translation-"));
    assert!(disposition.ends_with(".mp3\""));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    assert_eq!(bytes.as_ref(), &[0xff, 0xfb, 0x90, 0x00]);

    let (_, body) = call(&state, "GET", "/session/translation/audio?filename=clip.mp3", None).await?;
    assert_eq!(body.len(), 4);

    Ok(())
}

async fn download_disposition(state: &AppState, query: &str) -> Result<String> {
    let request = Request::builder()
        .uri(format!("/session/translation/audio?filename={}", query))
        .body(Body::empty())?;
    let response = create_router(state.clone()).oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);

    Ok(response.headers()[header::CONTENT_DISPOSITION].to_str()?.to_string())
}

#[tokio::test]
async fn test_requested_download_name_is_sanitised() -> Result<()> {
    let (state, _h) = spawn_app();
    state.view.write().await.apply(SessionNotification::Translation {
        text: "e kaaro".to_string(),
        artifact: TranslationArtifact::new(vec![0xff, 0xfb], "audio/mpeg"),
    });

    assert_eq!(
        download_disposition(&state, "clip.mp3").await?,
        "attachment; filename=\"clip.mp3\""
    );
    // Extension appended when missing
    assert_eq!(
        download_disposition(&state, "my%20clip").await?,
        "attachment; filename=\"my clip.mp3\""
    );
    // Quotes cannot break out of the header parameter
    assert_eq!(
        download_disposition(&state, "a%22b.mp3%22%3B%20x%3D%22y").await?,
        "attachment; filename=\"ab.mp3; x=y.mp3\""
    );
    // Nothing usable left: generated name
    let fallback = download_disposition(&state, "%22%22").await?;
    assert!(fallback.starts_with("attachment; filename=\"femseek-translation-"));
    assert!(fallback.ends_with(".mp3\""));

    Ok(())
}

#[tokio::test]
async fn test_payment_endpoints_without_pending_flow() -> Result<()> {
    let (state, _h) = spawn_app();

    let (status, body) = call_json(&state, "GET", "/payment/pending", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["pending"].is_null());

    let (status, _) = call_json(
        &state,
        "POST",
        "/payment/complete",
        Some(json!({"reference": "PSK_1"})),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call_json(&state, "POST", "/payment/cancel", None).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call_json(&state, "POST", "/payment/retry", None).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    Ok(())
}

#[tokio::test]
async fn test_payment_completed_through_api() -> Result<()> {
    let (state, h) = spawn_app();
    let mut handle = h.handle.clone();
    let connector = h.connector.clone();
    let notifications = h.notifications;
    state.track(notifications);
    let task = tokio::spawn(h.session.run());

    handle.start("user@example.com", "yo").await?;
    handle.wait_for(SessionState::Streaming).await;

    connector.latest().push_text(server::PAYMENT_REQUIRED).await;
    assert_eq!(handle.wait_for(SessionState::PaymentHeld).await, SessionState::PaymentHeld);

    let mut pending = Value::Null;
    for _ in 0..200 {
        let (_, body) = call_json(&state, "GET", "/payment/pending", None).await?;
        pending = body["pending"].clone();
        if !pending.is_null() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(pending["identity"], "user@example.com");
    assert_eq!(pending["charge"]["amount"], 500_000);
    assert_eq!(pending["charge"]["currency"], "NGN");

    let (status, _) = call_json(
        &state,
        "POST",
        "/payment/complete",
        Some(json!({"reference": "PSK_api"})),
    )
    .await?;
    assert_eq!(status, StatusCode::ACCEPTED);

    assert_eq!(handle.wait_for(SessionState::Streaming).await, SessionState::Streaming);
    assert_eq!(
        connector.latest().control_types(),
        vec!["auth", "payment_verification"]
    );

    handle.stop().await?;
    tokio::time::timeout(Duration::from_secs(2), task).await??;

    Ok(())
}
