use crate::entitlement::HttpPaymentBridge;
use crate::protocol::TranslationArtifact;
use crate::session::{SessionHandle, SessionNotification};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;

/// Latest session output, as seen by the external UI
#[derive(Debug, Default, Clone)]
pub struct SessionView {
    pub transcript: Option<String>,
    pub translation: Option<String>,
    pub artifact: Option<TranslationArtifact>,
    pub artifact_received_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl SessionView {
    /// Fold one notification into the view
    pub fn apply(&mut self, notification: SessionNotification) {
        match notification {
            SessionNotification::Transcript { text } => self.transcript = Some(text),
            SessionNotification::Translation { text, artifact } => {
                self.translation = Some(text);
                self.artifact = Some(artifact);
                self.artifact_received_at = Some(Utc::now());
            }
            SessionNotification::Error { message, .. } => self.last_error = Some(message),
            SessionNotification::StateChanged { .. } | SessionNotification::PaymentRequired { .. } => {}
        }
    }
}

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Control surface of the running session
    pub handle: SessionHandle,

    /// Latest transcript/translation
    pub view: Arc<RwLock<SessionView>>,

    /// Payment requests waiting for the UI
    pub payments: HttpPaymentBridge,
}

impl AppState {
    pub fn new(handle: SessionHandle, payments: HttpPaymentBridge) -> Self {
        Self {
            handle,
            view: Arc::new(RwLock::new(SessionView::default())),
            payments,
        }
    }

    /// Keep `view` up to date from the session's notifications
    pub fn track(&self, mut notifications: mpsc::UnboundedReceiver<SessionNotification>) -> JoinHandle<()> {
        let view = Arc::clone(&self.view);
        tokio::spawn(async move {
            while let Some(notification) = notifications.recv().await {
                view.write().await.apply(notification);
            }
            debug!("Notification stream ended");
        })
    }
}
