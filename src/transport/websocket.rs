use anyhow::{Context, Result};
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{Connection, Connector, Frame, Transport, TransportEvent};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Opens WebSocket connections (ws:// or wss://)
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    /// Capacity of the incoming event channel
    pub channel_capacity: usize,
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self {
            channel_capacity: 100,
        }
    }
}

#[async_trait::async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Connection> {
        info!("Connecting to {}", url);

        let (ws_stream, _response) = connect_async(url)
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;

        info!("WebSocket connection established");

        let (sink, mut stream) = ws_stream.split();
        let (event_tx, event_rx) = mpsc::channel(self.channel_capacity);
        let open = Arc::new(AtomicBool::new(true));

        // Spawn reader task
        let reader_open = Arc::clone(&open);
        let reader = tokio::spawn(async move {
            let mut finished = false;

            while let Some(msg) = stream.next().await {
                let event = match msg {
                    Ok(Message::Text(text)) => TransportEvent::Text(text.as_str().to_owned()),
                    Ok(Message::Binary(bytes)) => TransportEvent::Binary(bytes.to_vec()),
                    Ok(Message::Close(frame)) => {
                        finished = true;
                        TransportEvent::Closed(frame.map(|f| f.reason.as_str().to_owned()))
                    }
                    Ok(_) => continue, // ping/pong are answered by tungstenite
                    Err(e) => {
                        finished = true;
                        TransportEvent::Error(e.to_string())
                    }
                };

                if event_tx.send(event).await.is_err() {
                    debug!("Transport event receiver dropped");
                    break;
                }
                if finished {
                    break;
                }
            }

            reader_open.store(false, Ordering::SeqCst);

            // Stream ended without a close frame
            if !finished {
                let _ = event_tx.send(TransportEvent::Closed(None)).await;
            }

            debug!("WebSocket reader task stopped");
        });

        Ok(Connection {
            transport: Box::new(WebSocketTransport {
                sink,
                open,
                reader,
            }),
            events: event_rx,
        })
    }
}

/// Write half of a WebSocket connection
pub struct WebSocketTransport {
    sink: WsSink,
    open: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        if !self.is_open() {
            anyhow::bail!("WebSocket is closed");
        }

        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(bytes) => Message::Binary(bytes.into()),
        };

        self.sink
            .send(message)
            .await
            .context("Failed to send WebSocket frame")?;

        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Closing WebSocket connection");

        let result = self.sink.close().await;
        self.reader.abort();

        if let Err(e) = result {
            warn!("WebSocket close handshake failed: {}", e);
        }

        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
