//! FallbackPoller - periodic pull when the persistent channel is unavailable
//!
//! The poller owns an identifier cursor and one background tick task. Each
//! tick fetches entries after the cursor and hands them to the connection
//! manager, which accepts them through [`FallbackPoller::accept`]. The cursor
//! only moves when a batch is accepted, so a batch that arrives after `stop()`
//! is never lost to the next fallback period.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::connection::Signal;
use crate::events::RawMessage;

/// Floor for the tick interval so a zero interval cannot spin
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Errors from a poll request
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PollError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response: {0}")]
    Decode(String),
}

/// One entry returned by the poll endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolledEntry {
    /// Stable upstream identifier, usable as the next cursor
    pub id: String,
    /// Payload in the same shape the persistent channel delivers
    pub message: RawMessage,
}

impl PolledEntry {
    pub fn new(id: impl Into<String>, message: RawMessage) -> Self {
        Self {
            id: id.into(),
            message,
        }
    }
}

/// Pull-based source of job entries
#[async_trait]
pub trait PollSource: Send + Sync {
    /// Entries for `job_id` strictly after `cursor` (all retained entries if None)
    async fn fetch_since(&self, job_id: &str, cursor: Option<&str>) -> Result<Vec<PolledEntry>, PollError>;
}

/// Recurring fetch loop with an identifier cursor
#[derive(Debug)]
pub struct FallbackPoller {
    cursor: watch::Sender<Option<String>>,
    task: Option<JoinHandle<()>>,
}

impl Default for FallbackPoller {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackPoller {
    pub fn new() -> Self {
        let (cursor, _) = watch::channel(None);
        Self { cursor, task: None }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Identifier of the last accepted entry
    pub fn cursor(&self) -> Option<String> {
        self.cursor.borrow().clone()
    }

    /// Forget the cursor (the poller is being pointed at a different job)
    pub fn reset_cursor(&mut self) {
        debug!("FallbackPoller::reset_cursor: called");
        self.cursor.send_replace(None);
    }

    /// Start ticking; no-op if already running
    ///
    /// The first fetch happens immediately, then every `interval`. Results are
    /// reported as signals tagged with `generation`.
    pub(crate) fn start(
        &mut self,
        source: Arc<dyn PollSource>,
        job_id: String,
        interval: Duration,
        generation: u64,
        tx: mpsc::Sender<Signal>,
    ) -> bool {
        if self.task.is_some() {
            debug!(%job_id, "FallbackPoller::start: already running");
            return false;
        }

        let interval = interval.max(MIN_POLL_INTERVAL);
        info!(%job_id, interval_ms = interval.as_millis() as u64, "Fallback polling started");
        let cursor_rx = self.cursor.subscribe();
        self.task = Some(tokio::spawn(poll_loop(source, job_id, interval, generation, cursor_rx, tx)));
        true
    }

    /// Cancel the tick task; no-op if not running
    pub fn stop(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                info!("Fallback polling stopped");
                true
            }
            None => false,
        }
    }

    /// Drop entries already seen and advance the cursor past the rest
    ///
    /// Identifiers are opaque, so "at or before the cursor" is positional: if
    /// the cursor id appears in the batch, it and everything before it are
    /// echoes.
    pub fn accept(&mut self, mut entries: Vec<PolledEntry>) -> Vec<PolledEntry> {
        let cursor = self.cursor();
        let start = cursor
            .as_deref()
            .and_then(|c| entries.iter().position(|e| e.id == c))
            .map_or(0, |idx| idx + 1);

        let fresh = entries.split_off(start);
        if let Some(last) = fresh.last() {
            self.cursor.send_replace(Some(last.id.clone()));
        }

        debug!(
            received = start + fresh.len(),
            fresh = fresh.len(),
            cursor = ?self.cursor(),
            "FallbackPoller::accept"
        );
        fresh
    }
}

impl Drop for FallbackPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop(
    source: Arc<dyn PollSource>,
    job_id: String,
    interval: Duration,
    generation: u64,
    cursor: watch::Receiver<Option<String>>,
    tx: mpsc::Sender<Signal>,
) {
    loop {
        let since = cursor.borrow().clone();
        debug!(%job_id, ?since, "poll_loop: fetching");

        let signal = match source.fetch_since(&job_id, since.as_deref()).await {
            Ok(entries) => Signal::PollBatch { generation, entries },
            Err(error) => {
                warn!(%job_id, %error, "poll_loop: fetch failed");
                Signal::PollFailed { generation, error }
            }
        };

        if tx.send(signal).await.is_err() {
            debug!("poll_loop: manager gone, exiting");
            break;
        }

        tokio::time::sleep(interval).await;
    }
}
