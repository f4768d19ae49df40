//! Feed event types for live consumers
//!
//! These events describe every observable change the connection manager makes:
//! - Log stream (entry appended, log cleared)
//! - Agent map (agent updated)
//! - Connection lifecycle (state changed, job switched)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AgentStatus, ConnectionState, LogEntry};

/// Core event enum - the vocabulary of feed activity
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeedEvent {
    /// A log entry was appended to the store
    LogAppended { job_id: String, entry: LogEntry },
    /// An agent's status was inserted or overwritten
    AgentUpdated { job_id: String, agent: AgentStatus },
    /// The connection state machine moved
    StateChanged {
        job_id: String,
        from: ConnectionState,
        to: ConnectionState,
    },
    /// The log buffer was emptied by the consumer
    LogsCleared { job_id: String },
    /// The manager was pointed at a different job
    JobSwitched { job_id: String, previous: String },
}

impl FeedEvent {
    /// Get the job ID for this event
    pub fn job_id(&self) -> &str {
        match self {
            FeedEvent::LogAppended { job_id, .. }
            | FeedEvent::AgentUpdated { job_id, .. }
            | FeedEvent::StateChanged { job_id, .. }
            | FeedEvent::LogsCleared { job_id }
            | FeedEvent::JobSwitched { job_id, .. } => job_id,
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            FeedEvent::LogAppended { .. } => "LogAppended",
            FeedEvent::AgentUpdated { .. } => "AgentUpdated",
            FeedEvent::StateChanged { .. } => "StateChanged",
            FeedEvent::LogsCleared { .. } => "LogsCleared",
            FeedEvent::JobSwitched { .. } => "JobSwitched",
        }
    }
}

/// A timestamped feed event for file persistence
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedEventEntry {
    /// Timestamp of the event
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    /// The event
    pub event: FeedEvent,
}

impl FeedEventEntry {
    /// Create a new entry with current timestamp
    pub fn new(event: FeedEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}
