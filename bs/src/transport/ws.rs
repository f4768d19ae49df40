//! WebSocket transport (tokio-tungstenite)

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use super::{ConnectTarget, Transport, TransportError, TransportSink};
use crate::events::RawMessage;

/// Default handshake timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Persistent channel over a WebSocket
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    connect_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn name(&self) -> &'static str {
        "websocket"
    }

    async fn run(&self, target: ConnectTarget, sink: TransportSink) -> Result<(), TransportError> {
        debug!(url = %target.url, generation = sink.generation(), "WebSocketTransport::run: called");

        let mut request = target
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(format!("invalid WebSocket request: {}", e)))?;

        if let Some(bearer) = target.bearer() {
            let value = HeaderValue::from_str(&bearer)
                .map_err(|e| TransportError::Connect(format!("invalid bearer token: {}", e)))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (mut ws, _response) = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        info!(url = %target.url, "WebSocket connected");
        sink.opened().await;

        while let Some(frame) = ws.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    sink.message(RawMessage::from_text(text.as_str())).await;
                }
                Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                    Ok(text) => sink.message(RawMessage::from_text(text)).await,
                    Err(e) => warn!(error = %e, len = data.len(), "WebSocket: dropping non-UTF-8 binary frame"),
                },
                Ok(Message::Ping(payload)) => {
                    if let Err(e) = ws.send(Message::Pong(payload)).await {
                        return Err(TransportError::Protocol(e.to_string()));
                    }
                }
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "WebSocket: server closed connection");
                    return Ok(());
                }
                Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Err(e) => {
                    warn!(error = %e, "WebSocket: read error");
                    return Err(TransportError::Protocol(e.to_string()));
                }
            }
        }

        debug!("WebSocket: stream ended");
        Ok(())
    }
}
