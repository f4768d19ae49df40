//! ConnectionState domain type

use serde::{Deserialize, Serialize};

/// Lifecycle state of a job feed connection
///
/// Owned exclusively by the ConnectionManager. `Closed` and `Failed` are
/// terminal: nothing but an explicit reconnect leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Created, not yet connecting
    #[default]
    Idle,
    /// A connection attempt is in flight
    Connecting,
    /// The persistent channel is up and delivering messages
    Open,
    /// Waiting on the backoff timer before the next attempt
    Reconnecting,
    /// Persistent channel abandoned; pulling via the poll endpoint
    FallbackPolling,
    /// User disconnected
    Closed,
    /// Retries exhausted with fallback disabled
    Failed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Open)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }

    pub fn is_using_fallback(&self) -> bool {
        matches!(self, Self::FallbackPolling)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    /// True when the feed is doing (or trying to do) anything
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle | Self::Closed | Self::Failed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::FallbackPolling => write!(f, "fallback-polling"),
            Self::Closed => write!(f, "closed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
