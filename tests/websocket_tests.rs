// Integration tests for the WebSocket transport
//
// A local tungstenite server on 127.0.0.1:0 plays the translation service.

use anyhow::Result;
use femseek_client::transport::{Connector, Frame, TransportEvent, WebSocketConnector};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Accept one connection; answer text with `auth_success`, binary with its
/// length, and close with "bye" after the first binary frame
async fn spawn_server() -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        while let Some(Ok(msg)) = ws.next().await {
            match msg {
                Message::Text(_) => {
                    ws.send(Message::Text(r#"{"type":"auth_success"}"#.into()))
                        .await
                        .unwrap();
                }
                Message::Binary(bytes) => {
                    ws.send(Message::Text(format!("bytes:{}", bytes.len()).into()))
                        .await
                        .unwrap();
                    ws.close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "bye".into(),
                    }))
                    .await
                    .unwrap();
                }
                _ => {}
            }
        }
    });

    Ok(format!("ws://{}/ws/translate/", addr))
}

async fn next_event(events: &mut mpsc::Receiver<TransportEvent>) -> TransportEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("event stream ended")
}

#[tokio::test]
async fn test_websocket_text_binary_and_close() -> Result<()> {
    let url = spawn_server().await?;
    let connection = WebSocketConnector::default().connect(&url).await?;
    let mut transport = connection.transport;
    let mut events = connection.events;

    assert!(transport.is_open());

    transport
        .send(Frame::Text(r#"{"type":"auth","identity":"u1","target_lang":"yo"}"#.to_string()))
        .await?;
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Text(r#"{"type":"auth_success"}"#.to_string())
    );

    transport.send(Frame::Binary(vec![0u8; 4])).await?;
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Text("bytes:4".to_string())
    );
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Closed(Some("bye".to_string()))
    );

    // Reader marks the connection closed once the peer is gone
    for _ in 0..100 {
        if !transport.is_open() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(!transport.is_open());
    assert!(transport.send(Frame::Binary(vec![1])).await.is_err());

    Ok(())
}

#[tokio::test]
async fn test_websocket_close_is_idempotent() -> Result<()> {
    let url = spawn_server().await?;
    let connection = WebSocketConnector::default().connect(&url).await?;
    let mut transport = connection.transport;

    transport.close().await?;
    transport.close().await?;

    assert!(!transport.is_open());
    assert!(transport.send(Frame::Text("{}".to_string())).await.is_err());

    Ok(())
}

#[tokio::test]
async fn test_websocket_connect_refused() -> Result<()> {
    // Bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let result = WebSocketConnector::default()
        .connect(&format!("ws://{}/ws/translate/", addr))
        .await;

    assert!(result.is_err());

    Ok(())
}
