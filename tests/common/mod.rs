// In-memory collaborators for driving a TranslationSession in tests
#![allow(dead_code)]

use anyhow::{bail, Result};
use femseek_client::audio::{AudioChunk, AudioChunkSource, CaptureProvider};
use femseek_client::entitlement::{ChargeDescriptor, HttpPaymentBridge};
use femseek_client::protocol::ProtocolCodec;
use femseek_client::session::{
    SessionConfig, SessionDeps, SessionHandle, SessionNotification, TranslationSession,
};
use femseek_client::transport::{Connection, Connector, Frame, Transport, TransportEvent};
use femseek_client::SessionError;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

// ============================================================================
// Transport
// ============================================================================

/// One connection opened through the mock connector
#[derive(Clone)]
pub struct MockConnection {
    pub sent: Arc<Mutex<Vec<Frame>>>,
    pub open: Arc<AtomicBool>,
    server: mpsc::Sender<TransportEvent>,
}

impl MockConnection {
    pub fn frames(&self) -> Vec<Frame> {
        self.sent.lock().unwrap().clone()
    }

    /// Text frames decoded as JSON
    pub fn control_messages(&self) -> Vec<Value> {
        self.frames()
            .into_iter()
            .filter_map(|frame| match frame {
                Frame::Text(text) => serde_json::from_str(&text).ok(),
                Frame::Binary(_) => None,
            })
            .collect()
    }

    /// `type` of every text frame, in order
    pub fn control_types(&self) -> Vec<String> {
        self.control_messages()
            .into_iter()
            .filter_map(|v| v["type"].as_str().map(str::to_string))
            .collect()
    }

    pub fn binary_count(&self) -> usize {
        self.frames()
            .iter()
            .filter(|f| matches!(f, Frame::Binary(_)))
            .count()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Deliver a text message from the server
    pub async fn push_text(&self, text: &str) {
        self.server
            .send(TransportEvent::Text(text.to_string()))
            .await
            .unwrap();
    }

    /// Server-side close
    pub async fn drop_connection(&self) {
        self.open.store(false, Ordering::SeqCst);
        let _ = self.server.send(TransportEvent::Closed(None)).await;
    }
}

struct MockTransport {
    sent: Arc<Mutex<Vec<Frame>>>,
    open: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        if !self.open.load(Ordering::SeqCst) {
            bail!("connection closed");
        }
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

/// Connector handing out in-memory connections
#[derive(Clone, Default)]
pub struct MockConnector {
    connections: Arc<Mutex<Vec<MockConnection>>>,
    /// Server messages already waiting when the next connection opens
    preload: Arc<Mutex<Vec<String>>>,
    fail: Arc<AtomicBool>,
    /// How long each connect takes before the connection exists
    delay: Arc<Mutex<Option<Duration>>>,
    urls: Arc<Mutex<Vec<String>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let connector = Self::default();
        connector.fail.store(true, Ordering::SeqCst);
        connector
    }

    pub fn with_delay(delay: Duration) -> Self {
        let connector = Self::default();
        *connector.delay.lock().unwrap() = Some(delay);
        connector
    }

    pub fn preload(&self, text: &str) {
        self.preload.lock().unwrap().push(text.to_string());
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    pub fn connection(&self, index: usize) -> MockConnection {
        self.connections.lock().unwrap()[index].clone()
    }

    pub fn latest(&self) -> MockConnection {
        self.connections.lock().unwrap().last().cloned().unwrap()
    }

    /// Connections currently open
    pub fn open_count(&self) -> usize {
        self.connections
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.is_open())
            .count()
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Connection> {
        self.urls.lock().unwrap().push(url.to_string());

        if self.fail.load(Ordering::SeqCst) {
            bail!("connection refused");
        }

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let (server, events) = mpsc::channel(64);
        for text in self.preload.lock().unwrap().drain(..) {
            server.try_send(TransportEvent::Text(text)).unwrap();
        }

        let connection = MockConnection {
            sent: Arc::new(Mutex::new(Vec::new())),
            open: Arc::new(AtomicBool::new(true)),
            server,
        };
        self.connections.lock().unwrap().push(connection.clone());

        Ok(Connection {
            transport: Box::new(MockTransport {
                sent: connection.sent,
                open: connection.open,
            }),
            events,
        })
    }
}

// ============================================================================
// Capture
// ============================================================================

#[derive(Default)]
struct CaptureShared {
    created: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    fail: AtomicBool,
    feed: Mutex<Option<mpsc::Sender<AudioChunk>>>,
    next_sequence: Mutex<u64>,
}

/// Capture provider whose sources emit chunks only when told to
#[derive(Clone, Default)]
pub struct MockCapture {
    shared: Arc<CaptureShared>,
}

impl MockCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every source start fails with `CaptureUnavailable`
    pub fn denied() -> Self {
        let capture = Self::default();
        capture.shared.fail.store(true, Ordering::SeqCst);
        capture
    }

    pub fn created(&self) -> usize {
        self.shared.created.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.shared.max_active.load(Ordering::SeqCst)
    }

    /// Emit one chunk from the active source; false if none is capturing
    pub async fn emit(&self, data: &[u8]) -> bool {
        let feed = self.shared.feed.lock().unwrap().clone();
        let Some(feed) = feed else {
            return false;
        };

        let sequence = {
            let mut next = self.shared.next_sequence.lock().unwrap();
            let sequence = *next;
            *next += 1;
            sequence
        };

        feed.send(AudioChunk {
            sequence,
            data: data.to_vec(),
            timestamp_ms: sequence * 1000,
        })
        .await
        .is_ok()
    }
}

impl CaptureProvider for MockCapture {
    fn create_source(&self) -> Result<Box<dyn AudioChunkSource>, SessionError> {
        self.shared.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSource {
            shared: Arc::clone(&self.shared),
            capturing: false,
        }))
    }
}

struct MockSource {
    shared: Arc<CaptureShared>,
    capturing: bool,
}

impl MockSource {
    fn release(&mut self) {
        if self.capturing {
            self.capturing = false;
            self.shared.active.fetch_sub(1, Ordering::SeqCst);
            *self.shared.feed.lock().unwrap() = None;
        }
    }
}

#[async_trait::async_trait]
impl AudioChunkSource for MockSource {
    async fn start(
        &mut self,
        _cadence: Duration,
    ) -> Result<mpsc::Receiver<AudioChunk>, SessionError> {
        if self.shared.fail.load(Ordering::SeqCst) {
            return Err(SessionError::CaptureUnavailable(
                "permission denied".to_string(),
            ));
        }

        let (tx, rx) = mpsc::channel(16);
        *self.shared.feed.lock().unwrap() = Some(tx);
        *self.shared.next_sequence.lock().unwrap() = 0;

        self.capturing = true;
        let active = self.shared.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_active.fetch_max(active, Ordering::SeqCst);

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.release();
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "mock"
    }
}

impl Drop for MockSource {
    fn drop(&mut self) {
        self.release();
    }
}

// ============================================================================
// Session harness
// ============================================================================

pub struct Harness {
    pub session: TranslationSession,
    pub handle: SessionHandle,
    pub notifications: mpsc::UnboundedReceiver<SessionNotification>,
    pub connector: MockConnector,
    pub capture: MockCapture,
    pub payments: HttpPaymentBridge,
}

impl Harness {
    pub fn new(config: SessionConfig) -> Self {
        Self::with(config, MockConnector::new(), MockCapture::new())
    }

    pub fn with(config: SessionConfig, connector: MockConnector, capture: MockCapture) -> Self {
        let payments = HttpPaymentBridge::new();
        let deps = SessionDeps {
            connector: Arc::new(connector.clone()),
            capture: Arc::new(capture.clone()),
            payments: Arc::new(payments.clone()),
            charge: ChargeDescriptor::default(),
            codec: ProtocolCodec::default(),
        };

        let (session, handle, notifications) = TranslationSession::new(config, deps);

        Self {
            session,
            handle,
            notifications,
            connector,
            capture,
            payments,
        }
    }

    /// Process one event, failing the test if none arrives in time
    pub async fn step(&mut self) {
        let progressed = tokio::time::timeout(Duration::from_secs(2), self.session.step())
            .await
            .expect("session made no progress");
        assert!(progressed, "session has no event sources left");
    }

    /// Start and step through to `Streaming`
    pub async fn start_streaming(&mut self) {
        self.session.start("user@example.com", "yo").await.unwrap();
        self.step().await; // connected, auth sent
        self.step().await; // capture started
    }

    /// Wait until the payment flow is parked on the bridge
    pub async fn wait_for_payment_flow(&self) {
        for _ in 0..200 {
            if self.payments.pending().is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("payment flow was never opened");
    }

    /// Everything notified so far
    pub fn drain_notifications(&mut self) -> Vec<SessionNotification> {
        let mut out = Vec::new();
        while let Ok(notification) = self.notifications.try_recv() {
            out.push(notification);
        }
        out
    }
}

pub fn fatal_errors(notifications: &[SessionNotification]) -> Vec<String> {
    notifications
        .iter()
        .filter_map(|n| match n {
            SessionNotification::Error {
                message,
                fatal: true,
            } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

pub fn test_config() -> SessionConfig {
    SessionConfig {
        session_id: "test-session".to_string(),
        endpoint_url: "ws://translate.test/ws/translate/".to_string(),
        cadence: Duration::from_millis(100),
        ..SessionConfig::default()
    }
}

/// Server messages used across tests
pub mod server {
    pub const PAYMENT_REQUIRED: &str = r#"{"type":"payment_required"}"#;
    pub const AUTH_SUCCESS: &str = r#"{"type":"auth_success"}"#;

    pub fn transcript(text: &str) -> String {
        serde_json::json!({"type": "transcription_update", "text": text}).to_string()
    }

    pub fn error(message: &str) -> String {
        serde_json::json!({"type": "error", "message": message}).to_string()
    }
}
