use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::errors::ClientError;

/// Something the socket produced.
#[derive(Debug)]
pub enum SocketEvent {
    Frame(String),
    Error(String),
}

/// One live socket, reduced to text frames in both directions.
///
/// Dropping `outbound` closes the socket; `inbound` ending means the socket
/// closed. An Error event precedes an unclean close.
pub struct Transport {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<SocketEvent>,
}

/// Seam between the reconnect driver and the wire, so the driver is
/// testable against a scripted transport.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Transport, ClientError>;
}

/// The real thing: a WebSocket via tokio-tungstenite.
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Transport, ClientError> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let (mut ws_tx, mut ws_rx) = ws.split();

        let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
        let (in_tx, in_rx) = mpsc::channel::<SocketEvent>(64);

        // Writer: forward queued frames; a dropped sender closes the socket.
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if ws_tx.send(Message::text(frame)).await.is_err() {
                    break;
                }
            }
            let _ = ws_tx.close().await;
        });

        // Reader: surface text frames and errors, end on close.
        tokio::spawn(async move {
            while let Some(msg) = ws_rx.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(SocketEvent::Frame(text.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        let _ = in_tx.send(SocketEvent::Error(err.to_string())).await;
                        break;
                    }
                }
            }
        });

        Ok(Transport {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
