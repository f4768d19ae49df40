//! LogEntry domain type
//!
//! A LogEntry is one line of the job's activity log. Drafts are produced by the
//! translator and the connection manager; the EventStore stamps them with an
//! id and a sequence number on append.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Severity/category of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
    AgentStatus,
}

impl LogKind {
    /// Parse a severity string as sent by the backend
    ///
    /// Accepts the usual aliases (`warn`, `err`, `ok`). Returns None for anything
    /// unrecognised so the caller can choose the fallback.
    pub fn from_severity(severity: &str) -> Option<Self> {
        match severity.trim().to_ascii_lowercase().as_str() {
            "info" | "debug" | "trace" => Some(Self::Info),
            "success" | "ok" => Some(Self::Success),
            "warning" | "warn" => Some(Self::Warning),
            "error" | "err" | "fatal" => Some(Self::Error),
            "agent_status" => Some(Self::AgentStatus),
            other => {
                debug!(severity = %other, "LogKind::from_severity: unrecognised severity");
                None
            }
        }
    }
}

impl std::fmt::Display for LogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Success => write!(f, "success"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::AgentStatus => write!(f, "agent_status"),
        }
    }
}

/// Clamp an arbitrary numeric progress value into 0..=100
pub fn clamp_progress(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

/// A log entry before the store has assigned identity and ordering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntryDraft {
    pub kind: LogKind,
    pub message: String,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub status: Option<String>,
    /// Upstream identifier (e.g. a polled entry id), used for deduplication
    #[serde(default)]
    pub source_id: Option<String>,
}

impl LogEntryDraft {
    pub fn new(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            agent: None,
            progress: None,
            status: None,
            source_id: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogKind::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogKind::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogKind::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogKind::Error, message)
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }
}

/// A log entry as held by the EventStore
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Generated identifier (UUID v7)
    pub id: String,

    /// Store-assigned ordering key, strictly increasing per store
    pub sequence: u64,

    /// Wall-clock time of append; informational only, may collide
    pub timestamp: DateTime<Utc>,

    pub kind: LogKind,

    pub message: String,

    #[serde(default)]
    pub agent: Option<String>,

    #[serde(default)]
    pub progress: Option<u8>,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub source_id: Option<String>,
}

impl LogEntry {
    /// Stamp a draft with identity and ordering
    pub(crate) fn from_draft(draft: LogEntryDraft, id: String, sequence: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            sequence,
            timestamp,
            kind: draft.kind,
            message: draft.message,
            agent: draft.agent,
            progress: draft.progress,
            status: draft.status,
            source_id: draft.source_id,
        }
    }
}
