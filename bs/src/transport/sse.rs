//! Server-sent events transport (reqwest-eventsource)
//!
//! For backends that only stream SSE. Each `data:` payload is one inbound
//! message; the end of the stream counts as a close.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use tracing::{debug, info, warn};

use super::{ConnectTarget, Transport, TransportError, TransportSink};
use crate::events::RawMessage;

/// Persistent channel over server-sent events
#[derive(Debug, Clone, Default)]
pub struct SseTransport {
    http: reqwest::Client,
}

impl SseTransport {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for SseTransport {
    fn name(&self) -> &'static str {
        "sse"
    }

    async fn run(&self, target: ConnectTarget, sink: TransportSink) -> Result<(), TransportError> {
        debug!(url = %target.url, generation = sink.generation(), "SseTransport::run: called");

        let mut request = self.http.get(&target.url).header("accept", "text/event-stream");
        if let Some(bearer) = target.bearer() {
            request = request.header("authorization", bearer);
        }

        let mut es = EventSource::new(request).map_err(|e| TransportError::Connect(e.to_string()))?;

        while let Some(event) = es.next().await {
            match event {
                Ok(Event::Open) => {
                    info!(url = %target.url, "SSE stream opened");
                    sink.opened().await;
                }
                Ok(Event::Message(msg)) => {
                    debug!(event = %msg.event, "SseTransport: received Event::Message");
                    sink.message(RawMessage::from_text(&msg.data)).await;
                }
                Err(reqwest_eventsource::Error::StreamEnded) => {
                    debug!("SseTransport: stream ended");
                    es.close();
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "SseTransport: stream error");
                    es.close();
                    return Err(TransportError::Connect(e.to_string()));
                }
            }
        }

        Ok(())
    }
}
