//! Message-oriented transport to the translation service
//!
//! Two payload kinds share one connection: text frames carry JSON control
//! messages, binary frames carry audio chunks. The session only sees the
//! traits here; `websocket` provides the production implementation.

mod websocket;

pub use websocket::{WebSocketConnector, WebSocketTransport};

use anyhow::Result;
use tokio::sync::mpsc;

/// One outgoing frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// Something that happened on an open connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Text(String),
    Binary(Vec<u8>),
    /// Peer closed the connection (optional close reason)
    Closed(Option<String>),
    /// Read side failed; no further events follow
    Error(String),
}

/// Write half of an open connection
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send one frame
    async fn send(&mut self, frame: Frame) -> Result<()>;

    /// Close the connection; calling it again is a no-op
    async fn close(&mut self) -> Result<()>;

    /// Whether the connection is still usable for sending
    fn is_open(&self) -> bool;
}

/// An opened connection: write half plus the stream of incoming events
pub struct Connection {
    pub transport: Box<dyn Transport>,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Opens connections to the service endpoint
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Connection>;
}
