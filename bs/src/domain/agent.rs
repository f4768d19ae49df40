//! AgentStatus domain type
//!
//! The latest known status of one build agent, keyed by agent name.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Agent lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    #[default]
    Idle,
    Working,
    Completed,
    Failed,
}

impl AgentState {
    /// Parse a backend status string, accepting common synonyms
    ///
    /// Unrecognised values map to Idle.
    pub fn parse_lenient(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "idle" | "pending" | "waiting" | "queued" => Self::Idle,
            "working" | "running" | "active" | "in_progress" | "busy" => Self::Working,
            "completed" | "complete" | "done" | "success" | "finished" => Self::Completed,
            "failed" | "error" | "errored" => Self::Failed,
            other => {
                debug!(status = %other, "AgentState::parse_lenient: unknown status, using idle");
                Self::Idle
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Working => write!(f, "working"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Latest status of a single agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    /// Agent name, unique within a job
    pub name: String,

    pub status: AgentState,

    /// Percent complete (0-100)
    pub progress: u8,

    #[serde(default)]
    pub current_task: Option<String>,
}

impl AgentStatus {
    pub fn new(name: impl Into<String>, status: AgentState, progress: u8) -> Self {
        Self {
            name: name.into(),
            status,
            progress: progress.min(100),
            current_task: None,
        }
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.current_task = Some(task.into());
        self
    }
}
