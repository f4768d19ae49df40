//! Connection manager messages
//!
//! Commands arrive from the facade; signals arrive from spawned tasks
//! (transport attempts, backoff timers, poll ticks). Every signal carries the
//! generation of the task that produced it.

use tokio::sync::oneshot;

use crate::events::RawMessage;
use crate::poller::{PollError, PolledEntry};
use crate::transport::TransportError;

/// Commands sent to the ConnectionManager actor
///
/// Each carries a reply channel acknowledged once the command is applied.
#[derive(Debug)]
pub enum Command {
    Connect { reply: oneshot::Sender<()> },
    Reconnect { reply: oneshot::Sender<()> },
    Disconnect { reply: oneshot::Sender<()> },
    ClearLogs { reply: oneshot::Sender<()> },
    SwitchJob { job_id: String, reply: oneshot::Sender<()> },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Connect { .. } => "connect",
            Command::Reconnect { .. } => "reconnect",
            Command::Disconnect { .. } => "disconnect",
            Command::ClearLogs { .. } => "clear_logs",
            Command::SwitchJob { .. } => "switch_job",
        }
    }
}

/// What a connection attempt reports
#[derive(Debug)]
pub enum TransportEvent {
    Opened,
    Message(RawMessage),
    Error(TransportError),
    Closed,
}

/// Internal signals from spawned tasks
#[derive(Debug)]
pub enum Signal {
    Transport { generation: u64, event: TransportEvent },
    BackoffElapsed { generation: u64 },
    PollBatch { generation: u64, entries: Vec<PolledEntry> },
    PollFailed { generation: u64, error: PollError },
}

impl Signal {
    pub fn generation(&self) -> u64 {
        match self {
            Signal::Transport { generation, .. }
            | Signal::BackoffElapsed { generation }
            | Signal::PollBatch { generation, .. }
            | Signal::PollFailed { generation, .. } => *generation,
        }
    }
}
