//! FeedHandle - the consumer-facing facade
//!
//! Cheap to clone. Reads come from the latest published snapshot; commands
//! go through the manager's channel and resolve once applied. Nothing here
//! returns an error: a manager that has already shut down simply ignores
//! commands.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::manager::{ConnectionManager, FeedCollaborators};
use super::messages::Command;
use super::snapshot::FeedSnapshot;
use crate::config::FeedConfig;
use crate::domain::{AgentStatus, ConnectionState, LogEntry};
use crate::events::{FeedBus, FeedEvent};

/// Command channel capacity
const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Handle to a running job feed
///
/// The feed shuts down (as if disconnected) once every handle is dropped.
#[derive(Clone)]
pub struct FeedHandle {
    tx: mpsc::Sender<Command>,
    snapshot_rx: watch::Receiver<Arc<FeedSnapshot>>,
    bus: FeedBus,
}

impl FeedHandle {
    /// Spawn a feed for `job_id`
    ///
    /// Must be called from within a tokio runtime. Connects immediately when
    /// `config.auto_connect` is set.
    pub fn spawn(job_id: impl Into<String>, config: FeedConfig, collaborators: FeedCollaborators) -> Self {
        Self::spawn_with_bus(job_id, config, collaborators, FeedBus::with_default_capacity())
    }

    /// Spawn a feed publishing onto an existing bus
    pub fn spawn_with_bus(
        job_id: impl Into<String>,
        config: FeedConfig,
        collaborators: FeedCollaborators,
        bus: FeedBus,
    ) -> Self {
        let job_id = job_id.into();
        debug!(%job_id, auto_connect = config.auto_connect, "FeedHandle::spawn: called");

        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                warn!(%job_id, error = %e, "Invalid feed config, using defaults");
                FeedConfig {
                    auto_connect: config.auto_connect,
                    ..FeedConfig::default()
                }
            }
        };

        let (tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(FeedSnapshot::initial(job_id.clone())));
        let (manager, signal_rx) = ConnectionManager::new(job_id.clone(), config, collaborators, bus.clone(), snapshot_tx);

        tokio::spawn(manager.run(cmd_rx, signal_rx));
        info!(%job_id, "Feed spawned");

        Self { tx, snapshot_rx, bus }
    }

    // === Reads ===

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<FeedSnapshot> {
        self.snapshot_rx.borrow().clone()
    }

    pub fn job_id(&self) -> String {
        self.snapshot().job_id.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.snapshot().state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn is_connecting(&self) -> bool {
        self.state().is_connecting()
    }

    pub fn is_using_fallback(&self) -> bool {
        self.state().is_using_fallback()
    }

    pub fn error(&self) -> Option<String> {
        self.snapshot().error.clone()
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.snapshot().logs.clone()
    }

    pub fn agents(&self) -> BTreeMap<String, AgentStatus> {
        self.snapshot().agents.clone()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.snapshot().reconnect_attempts
    }

    /// Watch snapshots; the receiver sees the latest one on every change
    pub fn subscribe(&self) -> watch::Receiver<Arc<FeedSnapshot>> {
        self.snapshot_rx.clone()
    }

    /// Stream of individual feed events
    pub fn subscribe_events(&self) -> broadcast::Receiver<FeedEvent> {
        self.bus.subscribe()
    }

    /// Wait until a snapshot satisfies `predicate`, or `timeout` passes
    ///
    /// Returns the matching snapshot, or None on timeout or shutdown.
    pub async fn wait_for<F>(&self, timeout: Duration, mut predicate: F) -> Option<Arc<FeedSnapshot>>
    where
        F: FnMut(&FeedSnapshot) -> bool,
    {
        let mut rx = self.snapshot_rx.clone();
        match tokio::time::timeout(timeout, rx.wait_for(|s| predicate(&**s))).await {
            Ok(Ok(snapshot)) => Some(Arc::clone(&snapshot)),
            _ => None,
        }
    }

    // === Commands ===

    /// Start connecting if idle
    pub async fn connect(&self) {
        self.send(|reply| Command::Connect { reply }).await;
    }

    /// Force a fresh connection attempt from any state
    pub async fn reconnect(&self) {
        self.send(|reply| Command::Reconnect { reply }).await;
    }

    /// Stop everything; state becomes Closed
    pub async fn disconnect(&self) {
        self.send(|reply| Command::Disconnect { reply }).await;
    }

    /// Empty the log buffer, keeping agents
    pub async fn clear_logs(&self) {
        self.send(|reply| Command::ClearLogs { reply }).await;
    }

    /// Attach the feed to a different job
    pub async fn switch_job(&self, job_id: impl Into<String>) {
        let job_id = job_id.into();
        self.send(|reply| Command::SwitchJob { job_id, reply }).await;
    }

    async fn send(&self, make: impl FnOnce(oneshot::Sender<()>) -> Command) {
        let (reply, rx) = oneshot::channel();
        let cmd = make(reply);
        let name = cmd.name();

        if self.tx.send(cmd).await.is_err() {
            debug!(command = name, "FeedHandle: manager gone, ignoring command");
            return;
        }
        if rx.await.is_err() {
            debug!(command = name, "FeedHandle: manager dropped reply");
        }
    }
}

impl std::fmt::Debug for FeedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("FeedHandle")
            .field("job_id", &snapshot.job_id)
            .field("state", &snapshot.state)
            .field("logs", &snapshot.logs.len())
            .finish()
    }
}
