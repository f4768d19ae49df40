//! FeedSnapshot - what readers see

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::domain::{AgentStatus, ConnectionState, LogEntry};

/// Immutable view of one feed, published after every change
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedSnapshot {
    pub job_id: String,
    pub state: ConnectionState,
    /// Set only in `Failed`
    pub error: Option<String>,
    /// Consecutive failed attempts since the last `Open` or reconnect
    pub reconnect_attempts: u32,
    /// Delay chosen for the most recent scheduled retry
    pub last_delay: Option<Duration>,
    /// A backoff timer is armed
    pub backoff_pending: bool,
    /// The fallback poller is ticking
    pub polling: bool,
    pub poll_cursor: Option<String>,
    /// Oldest first
    pub logs: Vec<LogEntry>,
    pub agents: BTreeMap<String, AgentStatus>,
}

impl FeedSnapshot {
    pub(crate) fn initial(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            ..Default::default()
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn is_connecting(&self) -> bool {
        self.state.is_connecting()
    }

    pub fn is_using_fallback(&self) -> bool {
        self.state.is_using_fallback()
    }
}
