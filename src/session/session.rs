use std::future::pending;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::config::{ServerErrorPolicy, SessionConfig, StartPolicy};
use super::events::{SessionCommand, SessionEvent, SessionNotification};
use super::handle::SessionHandle;
use super::state::SessionState;
use super::stats::{SessionCounters, SessionStats};
use crate::audio::{AudioChunk, AudioChunkSource, CaptureProvider};
use crate::entitlement::{
    ChargeDescriptor, EntitlementGate, GateDecision, PaymentCapability, PaymentOutcome,
};
use crate::error::SessionError;
use crate::protocol::{ClientMessage, Inbound, ProtocolCodec};
use crate::transport::{Connection, Connector, Frame, Transport, TransportEvent};

/// External collaborators a session needs
pub struct SessionDeps {
    pub connector: Arc<dyn Connector>,
    pub capture: Arc<dyn CaptureProvider>,
    pub payments: Arc<dyn PaymentCapability>,
    pub charge: ChargeDescriptor,
    pub codec: ProtocolCodec,
}

/// Which source produced the next event
enum Ready {
    Command(Option<SessionCommand>),
    Transport(Option<TransportEvent>),
    Connected(Result<anyhow::Result<Connection>, JoinError>),
    Payment(Result<PaymentOutcome, JoinError>),
    BeginStreaming,
    Chunk(Option<AudioChunk>),
    AuthDeadline,
}

/// A translation session: connection, authentication, audio streaming and
/// payment suspension for one user
///
/// All state lives here and is only touched from `handle`, which processes
/// one event to completion before the next is admitted. Use [`run`] to drive
/// it as a task, or [`step`] to drive it event by event.
///
/// [`run`]: TranslationSession::run
/// [`step`]: TranslationSession::step
pub struct TranslationSession {
    config: SessionConfig,
    codec: ProtocolCodec,
    connector: Arc<dyn Connector>,
    capture: Arc<dyn CaptureProvider>,
    gate: EntitlementGate,

    commands: mpsc::Receiver<SessionCommand>,
    commands_open: bool,
    notifications: mpsc::UnboundedSender<SessionNotification>,
    state_tx: watch::Sender<SessionState>,
    counters: Arc<SessionCounters>,

    identity: String,
    target_lang: String,
    state: SessionState,
    last_error: Option<String>,

    /// Write half of the live connection (at most one)
    transport: Option<Box<dyn Transport>>,
    transport_events: Option<mpsc::Receiver<TransportEvent>>,
    pending_connect: Option<JoinHandle<anyhow::Result<Connection>>>,

    /// Active capture source (at most one)
    source: Option<Box<dyn AudioChunkSource>>,
    chunks: Option<mpsc::Receiver<AudioChunk>>,

    pending_payment: Option<JoinHandle<PaymentOutcome>>,
    /// Verification to send after the next `auth` (payment confirmed while
    /// the connection was down)
    pending_verification: Option<ClientMessage>,

    begin_streaming: bool,
    auth_deadline: Option<Instant>,
}

impl TranslationSession {
    /// Create an idle session
    ///
    /// Returns the session, a handle for issuing commands, and the stream of
    /// notifications for the UI.
    pub fn new(
        config: SessionConfig,
        deps: SessionDeps,
    ) -> (Self, SessionHandle, mpsc::UnboundedReceiver<SessionNotification>) {
        info!("Creating translation session: {}", config.session_id);

        let (command_tx, command_rx) = mpsc::channel(config.command_capacity.max(1));
        let (notification_tx, notification_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let counters = Arc::new(SessionCounters::default());

        let gate = EntitlementGate::new(deps.payments, deps.charge)
            .with_timeout(config.payment_timeout);

        let handle = SessionHandle::new(command_tx, state_rx, Arc::clone(&counters));

        let session = Self {
            config,
            codec: deps.codec,
            connector: deps.connector,
            capture: deps.capture,
            gate,
            commands: command_rx,
            commands_open: true,
            notifications: notification_tx,
            state_tx,
            counters,
            identity: String::new(),
            target_lang: String::new(),
            state: SessionState::Idle,
            last_error: None,
            transport: None,
            transport_events: None,
            pending_connect: None,
            source: None,
            chunks: None,
            pending_payment: None,
            pending_verification: None,
            begin_streaming: false,
            auth_deadline: None,
        };

        (session, handle, notification_rx)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn target_lang(&self) -> &str {
        &self.target_lang
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether a connection is currently held
    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    /// Whether a capture source is currently held
    pub fn is_capturing(&self) -> bool {
        self.source.is_some()
    }

    pub fn stats(&self) -> SessionStats {
        self.counters.snapshot(self.state)
    }

    /// Process events until the session closes
    pub async fn run(mut self) {
        info!("Session {} event loop started", self.config.session_id);

        while let Some(event) = self.next_event().await {
            self.handle(event).await;

            if self.state == SessionState::Closed {
                break;
            }
        }

        // Nothing left to wait on: make sure everything is released
        self.stop().await;

        info!("Session {} event loop stopped", self.config.session_id);
    }

    /// Wait for and process a single event
    ///
    /// Returns false when no event source is left.
    pub async fn step(&mut self) -> bool {
        match self.next_event().await {
            Some(event) => {
                self.handle(event).await;
                true
            }
            None => false,
        }
    }

    /// Wait for the next event
    ///
    /// Sources are polled in a fixed priority: commands, then server
    /// messages, then connection/payment completions, then the queued capture
    /// start, then audio chunks. A server message already waiting on the
    /// connection is therefore seen before capture is acquired.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        let ready = tokio::select! {
            biased;

            command = self.commands.recv(), if self.commands_open => Ready::Command(command),
            event = recv_or_pending(&mut self.transport_events), if self.transport_events.is_some() => {
                Ready::Transport(event)
            }
            result = join_or_pending(&mut self.pending_connect), if self.pending_connect.is_some() => {
                Ready::Connected(result)
            }
            outcome = join_or_pending(&mut self.pending_payment), if self.pending_payment.is_some() => {
                Ready::Payment(outcome)
            }
            _ = std::future::ready(()), if self.begin_streaming => Ready::BeginStreaming,
            chunk = recv_or_pending(&mut self.chunks), if self.chunks.is_some() => Ready::Chunk(chunk),
            _ = sleep_or_pending(self.auth_deadline), if self.auth_deadline.is_some() => Ready::AuthDeadline,
            else => return None,
        };

        let event = match ready {
            Ready::Command(Some(command)) => SessionEvent::Command(command),
            Ready::Command(None) => {
                debug!("All session handles dropped");
                self.commands_open = false;
                SessionEvent::Command(SessionCommand::Stop)
            }
            Ready::Transport(Some(event)) => SessionEvent::Transport(event),
            Ready::Transport(None) => {
                self.transport_events = None;
                SessionEvent::TransportLost
            }
            Ready::Connected(result) => {
                self.pending_connect = None;
                SessionEvent::Connected(result.map_err(anyhow::Error::from).and_then(|r| r))
            }
            Ready::Payment(result) => {
                self.pending_payment = None;
                match result {
                    Ok(outcome) => SessionEvent::PaymentResolved(outcome),
                    Err(e) => {
                        warn!("Payment task failed: {}", e);
                        SessionEvent::PaymentResolved(PaymentOutcome::Cancelled)
                    }
                }
            }
            Ready::BeginStreaming => {
                self.begin_streaming = false;
                SessionEvent::BeginStreaming
            }
            Ready::Chunk(Some(chunk)) => SessionEvent::Chunk(chunk),
            Ready::Chunk(None) => {
                self.chunks = None;
                SessionEvent::CaptureEnded
            }
            Ready::AuthDeadline => {
                self.auth_deadline = None;
                SessionEvent::AuthTimedOut
            }
        };

        Some(event)
    }

    /// Apply one event
    pub async fn handle(&mut self, event: SessionEvent) {
        debug!("Session {} handling {} in {}", self.config.session_id, event.kind(), self.state);

        match event {
            SessionEvent::Command(command) => self.apply_command(command).await,
            SessionEvent::Connected(Ok(connection)) => self.on_transport_open(connection).await,
            SessionEvent::Connected(Err(e)) => {
                self.fail(SessionError::Transport(format!("{:#}", e))).await
            }
            SessionEvent::Transport(event) => self.on_transport_event(event).await,
            SessionEvent::TransportLost => {
                self.on_transport_dropped("connection lost".to_string()).await
            }
            SessionEvent::Chunk(chunk) => self.forward_chunk(chunk).await,
            SessionEvent::CaptureEnded => {
                info!("Capture source ended");
                self.release_capture().await;
            }
            SessionEvent::BeginStreaming => self.begin_streaming().await,
            SessionEvent::PaymentResolved(outcome) => self.on_payment_outcome(outcome).await,
            SessionEvent::AuthTimedOut => {
                if self.state == SessionState::Authenticating {
                    let waited = self
                        .config
                        .auth_timeout
                        .map(|t| t.as_millis() as u64)
                        .unwrap_or_default();
                    self.fail(SessionError::AuthTimeout(waited)).await;
                }
            }
        }
    }

    async fn apply_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Start {
                identity,
                target_lang,
            } => {
                if let Err(e) = self.start(identity, target_lang).await {
                    warn!("Start rejected: {}", e);
                    self.notify(SessionNotification::Error {
                        message: e.to_string(),
                        fatal: false,
                    });
                }
            }
            SessionCommand::Stop => self.stop().await,
            SessionCommand::SetTargetLang(target_lang) => self.set_target_lang(target_lang).await,
            SessionCommand::RetryPayment => self.retry_payment(),
        }
    }

    /// Begin a session for `identity`, translating into `target_lang`
    ///
    /// Anything left from a previous run (connection, capture, payment flow)
    /// is released first.
    pub async fn start(
        &mut self,
        identity: impl Into<String>,
        target_lang: impl Into<String>,
    ) -> Result<(), SessionError> {
        if self.state == SessionState::Closed {
            return Err(SessionError::Closed);
        }

        let identity = identity.into();
        let target_lang = target_lang.into();
        if identity.trim().is_empty() {
            return Err(SessionError::InvalidStart("identity is empty".to_string()));
        }
        if target_lang.trim().is_empty() {
            return Err(SessionError::InvalidStart("target language is empty".to_string()));
        }

        if self.state != SessionState::Idle {
            info!("Restarting session {} from {}", self.config.session_id, self.state);
        }

        self.release_resources().await;
        self.pending_verification = None;
        self.last_error = None;
        self.identity = identity;
        self.target_lang = target_lang;
        self.counters.mark_started();

        info!(
            "Starting session {} for {} (target language {})",
            self.config.session_id, self.identity, self.target_lang
        );

        self.transition(SessionState::Connecting);
        self.connect();

        Ok(())
    }

    /// Close the session and release everything; safe to call repeatedly
    pub async fn stop(&mut self) {
        if self.state == SessionState::Closed {
            debug!("Session {} already closed", self.config.session_id);
            return;
        }

        info!("Stopping session: {}", self.config.session_id);

        self.release_resources().await;
        self.pending_verification = None;
        self.transition(SessionState::Closed);
    }

    /// Change the target language; forwarded to the service when connected
    pub async fn set_target_lang(&mut self, target_lang: impl Into<String>) {
        let target_lang = target_lang.into();
        if target_lang.trim().is_empty() {
            warn!("Ignoring empty target language");
            return;
        }
        if target_lang == self.target_lang {
            return;
        }

        info!("Target language changed: {} -> {}", self.target_lang, target_lang);
        self.target_lang = target_lang;

        if self.state.accepts_config() && self.transport.is_some() {
            let config = ClientMessage::Config {
                target_lang: self.target_lang.clone(),
            };
            // Best effort: a broken connection surfaces through its own events
            if let Err(e) = self.send_control(&config).await {
                warn!("Failed to send language change: {}", e);
            }
        } else {
            debug!("Target language will be sent with the next auth");
        }
    }

    /// Reopen the payment flow after the user cancelled it
    pub fn retry_payment(&mut self) {
        if self.state != SessionState::PaymentHeld {
            debug!("No payment to retry in state {}", self.state);
            return;
        }

        self.open_payment();
    }

    fn connect(&mut self) {
        let connector = Arc::clone(&self.connector);
        let url = self.config.endpoint_url.clone();

        self.pending_connect = Some(tokio::spawn(async move { connector.connect(&url).await }));
    }

    async fn on_transport_open(&mut self, connection: Connection) {
        if self.state != SessionState::Connecting {
            debug!("Discarding connection opened in state {}", self.state);
            let mut transport = connection.transport;
            let _ = transport.close().await;
            return;
        }

        self.transport = Some(connection.transport);
        self.transport_events = Some(connection.events);
        self.transition(SessionState::Authenticating);

        // Authentication is fire-and-forget: no round trip before streaming
        let auth = ClientMessage::Auth {
            identity: self.identity.clone(),
            target_lang: self.target_lang.clone(),
        };
        if let Err(e) = self.send_control(&auth).await {
            self.fail(e).await;
            return;
        }

        if let Some(verification) = self.pending_verification.take() {
            if let Err(e) = self.send_control(&verification).await {
                self.fail(e).await;
                return;
            }
        }

        match self.config.start_policy {
            StartPolicy::Immediate => self.begin_streaming = true,
            StartPolicy::AwaitAuthSuccess => {
                info!("Waiting for auth_success before capturing");
                self.auth_deadline = self.config.auth_timeout.map(|t| Instant::now() + t);
            }
        }
    }

    async fn begin_streaming(&mut self) {
        if self.state != SessionState::Authenticating {
            debug!("Skipping capture start in state {}", self.state);
            return;
        }

        self.auth_deadline = None;

        match self.start_capture().await {
            Ok(()) => self.transition(SessionState::Streaming),
            Err(e) => self.fail(e).await,
        }
    }

    async fn start_capture(&mut self) -> Result<(), SessionError> {
        self.release_capture().await;

        let mut source = self.capture.create_source()?;
        let chunks = source.start(self.config.cadence).await?;

        info!(
            "Capture started: {} ({}ms cadence)",
            source.name(),
            self.config.cadence.as_millis()
        );

        self.source = Some(source);
        self.chunks = Some(chunks);

        Ok(())
    }

    async fn forward_chunk(&mut self, chunk: AudioChunk) {
        if self.state != SessionState::Streaming {
            debug!("Dropping chunk {} in state {}", chunk.sequence, self.state);
            return;
        }

        let Some(transport) = self.transport.as_mut() else {
            debug!("Dropping chunk {}: no connection", chunk.sequence);
            return;
        };

        let sequence = chunk.sequence;
        let bytes = chunk.data.len();

        match transport.send(Frame::Binary(chunk.data)).await {
            Ok(()) => {
                SessionCounters::bump(&self.counters.chunks_sent);
                debug!("Sent audio chunk {} ({} bytes)", sequence, bytes);
            }
            Err(e) => self.fail(SessionError::Transport(format!("{:#}", e))).await,
        }
    }

    async fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Text(text) => self.on_text(&text).await,
            TransportEvent::Binary(bytes) => {
                debug!("Ignoring {} byte binary frame from server", bytes.len())
            }
            TransportEvent::Closed(reason) => {
                let reason = reason
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| "connection closed by server".to_string());
                self.on_transport_dropped(reason).await
            }
            TransportEvent::Error(e) => self.on_transport_dropped(e).await,
        }
    }

    async fn on_transport_dropped(&mut self, reason: String) {
        self.release_transport().await;

        match self.state {
            SessionState::PaymentHeld => {
                warn!(
                    "Connection lost while waiting for payment ({}); reconnecting after payment",
                    reason
                );
            }
            SessionState::Idle | SessionState::Closed | SessionState::Error => {
                debug!("Connection dropped in state {}: {}", self.state, reason);
            }
            _ => self.fail(SessionError::Transport(reason)).await,
        }
    }

    async fn on_text(&mut self, text: &str) {
        match self.codec.decode(text) {
            Ok(inbound) => self.dispatch(inbound).await,
            Err(e) if self.state == SessionState::Authenticating => self.fail(e.into()).await,
            Err(e) => {
                SessionCounters::bump(&self.counters.messages_dropped);
                warn!("Dropping undecodable server message: {}", e);
            }
        }
    }

    async fn dispatch(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::TranscriptionUpdate { text } => {
                SessionCounters::bump(&self.counters.transcript_updates);
                self.notify(SessionNotification::Transcript { text });
            }
            Inbound::TranslationResult { text, artifact } => {
                SessionCounters::bump(&self.counters.translations_received);
                info!(
                    "Translation received: {} bytes of {}",
                    artifact.len(),
                    artifact.mime_type
                );
                self.notify(SessionNotification::Translation { text, artifact });
            }
            Inbound::PaymentRequired => self.hold_for_payment().await,
            Inbound::AuthSuccess => {
                info!("Authenticated with translation service");
                if self.config.start_policy == StartPolicy::AwaitAuthSuccess
                    && self.state == SessionState::Authenticating
                {
                    self.auth_deadline = None;
                    self.begin_streaming = true;
                }
            }
            Inbound::ServerError { message } => self.on_server_error(message).await,
            Inbound::Ignored { tag } => debug!("Ignoring message type {}", tag),
        }
    }

    async fn hold_for_payment(&mut self) {
        if !self.state.can_hold_for_payment() {
            debug!("payment_required ignored in state {}", self.state);
            return;
        }

        // No audio may leave after this point
        self.begin_streaming = false;
        self.auth_deadline = None;
        self.release_capture().await;

        SessionCounters::bump(&self.counters.payment_holds);
        self.transition(SessionState::PaymentHeld);
        self.notify(SessionNotification::PaymentRequired {
            charge: self.gate.charge().clone(),
        });

        self.open_payment();
    }

    fn open_payment(&mut self) {
        if self.pending_payment.is_some() {
            debug!("Payment flow already open");
            return;
        }

        self.pending_payment = Some(self.gate.on_payment_required(&self.identity));
    }

    async fn on_payment_outcome(&mut self, outcome: PaymentOutcome) {
        if self.state != SessionState::PaymentHeld {
            debug!("Ignoring payment outcome in state {}", self.state);
            return;
        }

        match self.gate.on_payment_outcome(outcome) {
            GateDecision::Hold => {}
            GateDecision::Resume { verification } => self.resume(verification).await,
        }
    }

    async fn resume(&mut self, verification: ClientMessage) {
        let connected = self.transport.as_ref().is_some_and(|t| t.is_open());

        if !connected {
            info!("Connection gone; reconnecting before resuming");
            self.release_transport().await;
            self.pending_verification = Some(verification);
            self.transition(SessionState::Connecting);
            self.connect();
            return;
        }

        // Resume in place: the service already knows who we are
        if let Err(e) = self.send_control(&verification).await {
            self.fail(e).await;
            return;
        }

        match self.start_capture().await {
            Ok(()) => self.transition(SessionState::Streaming),
            Err(e) => self.fail(e).await,
        }
    }

    async fn on_server_error(&mut self, message: String) {
        warn!("Server reported an error: {}", message);

        match self.config.server_error_policy {
            ServerErrorPolicy::Fatal => self.fail(SessionError::Server(message)).await,
            ServerErrorPolicy::HaltCapture => {
                // Only a running source is halted; a capture start still
                // queued behind authentication goes ahead
                if self.source.is_some() {
                    self.release_capture().await;
                }
                self.notify(SessionNotification::Error {
                    message: SessionError::Server(message).to_string(),
                    fatal: false,
                });
            }
        }
    }

    async fn send_control(&mut self, message: &ClientMessage) -> Result<(), SessionError> {
        let text = self.codec.encode(message).map_err(|e| {
            SessionError::Transport(format!("failed to encode {}: {}", message.tag(), e))
        })?;

        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| SessionError::Transport("no open connection".to_string()))?;

        transport
            .send(Frame::Text(text))
            .await
            .map_err(|e| SessionError::Transport(format!("{:#}", e)))?;

        debug!("Sent {} message", message.tag());

        Ok(())
    }

    /// Move to `Error`, release everything, report once
    async fn fail(&mut self, err: SessionError) {
        if self.state.is_terminal() {
            debug!("Ignoring error in state {}: {}", self.state, err);
            return;
        }

        let message = err.to_string();
        error!("Session {} failed: {}", self.config.session_id, message);

        self.release_resources().await;
        self.last_error = Some(message.clone());
        self.counters.set_last_error(Some(message.clone()));

        self.transition(SessionState::Error);
        self.notify(SessionNotification::Error {
            message,
            fatal: true,
        });
    }

    async fn release_resources(&mut self) {
        if let Some(task) = self.pending_connect.take() {
            debug!("Cancelling pending connect");
            task.abort();
        }
        if let Some(task) = self.pending_payment.take() {
            debug!("Abandoning open payment flow");
            task.abort();
        }

        self.begin_streaming = false;
        self.auth_deadline = None;

        self.release_capture().await;
        self.release_transport().await;
    }

    async fn release_capture(&mut self) {
        self.chunks = None;

        if let Some(mut source) = self.source.take() {
            if let Err(e) = source.stop().await {
                warn!("Failed to stop {}: {}", source.name(), e);
            }
            info!("Capture stopped: {}", source.name());
        }
    }

    async fn release_transport(&mut self) {
        self.transport_events = None;

        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                warn!("Failed to close connection: {}", e);
            }
        }
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.state;
        if from == to {
            return;
        }

        info!("session {}: {} -> {}", self.config.session_id, from, to);

        self.state = to;
        self.state_tx.send_replace(to);
        self.notify(SessionNotification::StateChanged { from, to });
    }

    fn notify(&self, notification: SessionNotification) {
        if self.notifications.send(notification).is_err() {
            debug!("No listener for session notifications");
        }
    }
}

async fn recv_or_pending<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

async fn join_or_pending<T>(task: &mut Option<JoinHandle<T>>) -> Result<T, JoinError> {
    match task {
        Some(task) => task.await,
        None => pending().await,
    }
}

async fn sleep_or_pending(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => pending().await,
    }
}
