//! Transports - persistent channels to a backend job
//!
//! A [`Transport`] drives exactly one connection attempt. It reports progress
//! through the [`TransportSink`] it is handed and returns when the channel
//! ends: `Ok(())` for a clean close, `Err` for a failure. The connection
//! manager closes a transport by aborting the task running it.

mod http;
mod sse;
mod ws;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::connection::{Signal, TransportEvent};
use crate::events::RawMessage;

pub use http::{HttpPollSource, ServerTargets, collaborators_from_config};
pub use sse::SseTransport;
pub use ws::WebSocketTransport;

/// Errors from connection attempts
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Could not resolve connection target: {0}")]
    Target(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection timed out")]
    Timeout,
}

/// Where and how to connect for one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub url: String,
    /// Sent as `Authorization: Bearer <token>`
    pub token: Option<String>,
}

impl ConnectTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn bearer(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {}", t))
    }
}

/// Supplies the connection target for a job
#[async_trait]
pub trait TargetProvider: Send + Sync {
    async fn target(&self, job_id: &str) -> Result<ConnectTarget, TransportError>;
}

/// One persistent-channel implementation
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Drive one connection attempt until the channel ends
    async fn run(&self, target: ConnectTarget, sink: TransportSink) -> Result<(), TransportError>;
}

/// Generation-tagged reporting handle given to a transport attempt
///
/// Reports from an attempt that has since been superseded are discarded by
/// the connection manager.
#[derive(Clone)]
pub struct TransportSink {
    generation: u64,
    tx: mpsc::Sender<Signal>,
}

impl TransportSink {
    pub(crate) fn new(generation: u64, tx: mpsc::Sender<Signal>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The channel is up
    pub async fn opened(&self) {
        debug!(generation = self.generation, "TransportSink::opened");
        self.send(TransportEvent::Opened).await;
    }

    /// One inbound message
    pub async fn message(&self, raw: RawMessage) {
        self.send(TransportEvent::Message(raw)).await;
    }

    pub(crate) async fn error(&self, error: TransportError) {
        debug!(generation = self.generation, %error, "TransportSink::error");
        self.send(TransportEvent::Error(error)).await;
    }

    pub(crate) async fn closed(&self) {
        debug!(generation = self.generation, "TransportSink::closed");
        self.send(TransportEvent::Closed).await;
    }

    /// True once the manager has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, event: TransportEvent) {
        let signal = Signal::Transport {
            generation: self.generation,
            event,
        };
        if self.tx.send(signal).await.is_err() {
            debug!(generation = self.generation, "TransportSink: manager gone, dropping event");
        }
    }
}
