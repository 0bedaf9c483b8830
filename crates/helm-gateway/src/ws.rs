//! WebSocket transport over `tokio-tungstenite`.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use helm_core::{Frame, GatewayError};

use crate::transport::{Transport, TransportDialer};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One open WebSocket connection carrying JSON text frames.
pub struct WsTransport {
    stream: WsStream,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: Frame) -> Result<(), GatewayError> {
        let json = serde_json::to_string(&frame)
            .map_err(|e| GatewayError::Transport(format!("serialize frame: {e}")))?;
        self.stream
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| GatewayError::Transport(format!("send: {e}")))
    }

    async fn recv(&mut self) -> Option<Result<Frame, GatewayError>> {
        loop {
            let msg = self.stream.next().await?;
            match msg {
                Ok(Message::Text(text)) => {
                    return Some(
                        serde_json::from_str(&text)
                            .map_err(|e| GatewayError::Transport(format!("parse frame: {e}"))),
                    );
                }
                // Ping/pong handled by tungstenite; binary is not part of
                // the protocol.
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_)) => {}
                Ok(Message::Close(_)) | Err(_) => return None,
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// Dials gateway endpoints over WebSocket.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsDialer;

#[async_trait]
impl TransportDialer for WsDialer {
    async fn dial(&self, endpoint: &str) -> Result<Box<dyn Transport>, GatewayError> {
        debug!(endpoint, "dialing gateway");
        let (stream, _) = connect_async(endpoint)
            .await
            .map_err(|e| GatewayError::Transport(format!("connect {endpoint}: {e}")))?;
        Ok(Box::new(WsTransport { stream }))
    }
}
