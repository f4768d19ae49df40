//! ConnectionManager - actor that owns one job feed
//!
//! All connection state, the EventStore and the FallbackPoller live inside a
//! single tokio task. Facade commands and task signals are processed one at a
//! time, and a snapshot is published after each. Transport attempts, backoff
//! timers and poll ticks run in spawned tasks tagged with the generation that
//! spawned them; the generation moves on every new attempt, failure,
//! disconnect and reconnect, so late signals from a superseded task are
//! dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::messages::{Command, Signal, TransportEvent};
use super::policy::ReconnectPolicy;
use super::snapshot::FeedSnapshot;
use crate::config::FeedConfig;
use crate::domain::{ConnectionState, LogEntryDraft};
use crate::events::{FeedBus, FeedEvent, Translation, translate};
use crate::poller::{FallbackPoller, PollError, PollSource, PolledEntry};
use crate::store::EventStore;
use crate::transport::{TargetProvider, Transport, TransportSink};

/// Signal channel capacity
const SIGNAL_CHANNEL_CAPACITY: usize = 256;

/// Everything the manager talks to
#[derive(Clone)]
pub struct FeedCollaborators {
    pub transport: Arc<dyn Transport>,
    pub targets: Arc<dyn TargetProvider>,
    pub poll_source: Arc<dyn PollSource>,
}

pub(crate) struct ConnectionManager {
    job_id: String,
    config: FeedConfig,
    policy: ReconnectPolicy,
    collaborators: FeedCollaborators,

    state: ConnectionState,
    error: Option<String>,
    attempts: u32,
    last_delay: Option<Duration>,
    generation: u64,

    store: EventStore,
    poller: FallbackPoller,
    connection_task: Option<JoinHandle<()>>,
    backoff_task: Option<JoinHandle<()>>,

    signal_tx: mpsc::Sender<Signal>,
    bus: FeedBus,
    snapshot_tx: watch::Sender<Arc<FeedSnapshot>>,
}

impl ConnectionManager {
    pub(crate) fn new(
        job_id: String,
        config: FeedConfig,
        collaborators: FeedCollaborators,
        bus: FeedBus,
        snapshot_tx: watch::Sender<Arc<FeedSnapshot>>,
    ) -> (Self, mpsc::Receiver<Signal>) {
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
        let manager = Self {
            policy: ReconnectPolicy::from_config(&config),
            store: EventStore::new(config.max_logs),
            job_id,
            config,
            collaborators,
            state: ConnectionState::Idle,
            error: None,
            attempts: 0,
            last_delay: None,
            generation: 0,
            poller: FallbackPoller::new(),
            connection_task: None,
            backoff_task: None,
            signal_tx,
            bus,
            snapshot_tx,
        };
        (manager, signal_rx)
    }

    /// Process commands and signals until every facade handle is dropped
    pub(crate) async fn run(mut self, mut cmd_rx: mpsc::Receiver<Command>, mut signal_rx: mpsc::Receiver<Signal>) {
        info!(job_id = %self.job_id, "ConnectionManager started");

        if self.config.auto_connect {
            self.connect();
        }
        self.publish();

        loop {
            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        debug!(job_id = %self.job_id, "run: command channel closed, tearing down");
                        self.disconnect();
                        self.publish();
                        break;
                    }
                },
                Some(signal) = signal_rx.recv() => self.handle_signal(signal),
            }
            self.publish();
        }

        info!(job_id = %self.job_id, "ConnectionManager stopped");
    }

    fn handle_command(&mut self, cmd: Command) {
        debug!(command = cmd.name(), state = %self.state, "handle_command: called");
        let reply = match cmd {
            Command::Connect { reply } => {
                self.connect();
                reply
            }
            Command::Reconnect { reply } => {
                self.reconnect();
                reply
            }
            Command::Disconnect { reply } => {
                self.disconnect();
                reply
            }
            Command::ClearLogs { reply } => {
                self.clear_logs();
                reply
            }
            Command::SwitchJob { job_id, reply } => {
                self.switch_job(job_id);
                reply
            }
        };

        // Publish before acking so the caller observes the result
        self.publish();
        let _ = reply.send(());
    }

    fn handle_signal(&mut self, signal: Signal) {
        if signal.generation() != self.generation {
            debug!(
                signal_generation = signal.generation(),
                generation = self.generation,
                "handle_signal: dropping stale signal"
            );
            return;
        }

        match signal {
            Signal::Transport { event, .. } => self.on_transport_event(event),
            Signal::BackoffElapsed { .. } => self.on_backoff_elapsed(),
            Signal::PollBatch { entries, .. } => self.on_poll_batch(entries),
            Signal::PollFailed { error, .. } => self.on_poll_failed(error),
        }
    }

    // === Commands ===

    /// Idle → Connecting; no-op from any other state
    fn connect(&mut self) {
        if self.state != ConnectionState::Idle {
            debug!(state = %self.state, "connect: not idle, ignoring");
            return;
        }
        self.begin_attempt();
    }

    /// Any state → Connecting with a fresh attempt counter
    fn reconnect(&mut self) {
        info!(job_id = %self.job_id, from = %self.state, "Manual reconnect requested");
        self.teardown();
        self.attempts = 0;
        self.last_delay = None;
        self.error = None;
        self.append(LogEntryDraft::info("Reconnecting to live updates..."));
        self.begin_attempt();
    }

    /// Any state except Closed → Closed
    fn disconnect(&mut self) {
        if self.state == ConnectionState::Closed {
            debug!("disconnect: already closed");
            return;
        }
        info!(job_id = %self.job_id, from = %self.state, "Disconnecting");
        self.teardown();
        self.set_state(ConnectionState::Closed);
    }

    fn clear_logs(&mut self) {
        self.store.clear_logs();
        self.bus.emit(FeedEvent::LogsCleared {
            job_id: self.job_id.clone(),
        });
    }

    /// Point the manager at another job
    ///
    /// The store and poll cursor are reset. An active feed reconnects against
    /// the new job; an idle or terminal one stays where it is.
    fn switch_job(&mut self, job_id: String) {
        if job_id == self.job_id {
            debug!(%job_id, "switch_job: same job, ignoring");
            return;
        }

        let was_active = self.state.is_active();
        info!(from = %self.job_id, to = %job_id, was_active, "Switching job");

        self.teardown();
        self.store.clear();
        self.poller.reset_cursor();
        let previous = std::mem::replace(&mut self.job_id, job_id);
        self.bus.emit(FeedEvent::JobSwitched {
            job_id: self.job_id.clone(),
            previous,
        });

        if was_active {
            self.attempts = 0;
            self.last_delay = None;
            self.error = None;
            self.begin_attempt();
        }
    }

    // === Signals ===

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                if self.state == ConnectionState::Connecting {
                    self.enter_open();
                } else {
                    debug!(state = %self.state, "on_transport_event: opened outside Connecting");
                }
            }
            TransportEvent::Message(raw) => {
                if self.state != ConnectionState::Open {
                    debug!(state = %self.state, tag = ?raw.tag(), "on_transport_event: dropping message, not open");
                    return;
                }
                let translation = translate(&raw);
                self.apply(translation, None);
            }
            TransportEvent::Error(error) => self.on_transport_down(error.to_string()),
            TransportEvent::Closed => self.on_transport_down("connection closed".to_string()),
        }
    }

    fn on_transport_down(&mut self, reason: String) {
        if matches!(self.state, ConnectionState::Connecting | ConnectionState::Open) {
            self.enter_reconnecting(reason);
        } else {
            debug!(state = %self.state, %reason, "on_transport_down: ignoring");
        }
    }

    fn on_backoff_elapsed(&mut self) {
        self.backoff_task = None;
        if self.state == ConnectionState::Reconnecting {
            self.begin_attempt();
        }
    }

    fn on_poll_batch(&mut self, entries: Vec<PolledEntry>) {
        if self.state != ConnectionState::FallbackPolling {
            debug!(state = %self.state, "on_poll_batch: not polling, dropping batch");
            return;
        }

        for entry in self.poller.accept(entries) {
            if self.store.contains_source(&entry.id) {
                debug!(id = %entry.id, "on_poll_batch: duplicate entry");
                continue;
            }
            let translation = translate(&entry.message);
            self.apply(translation, Some(entry.id));
        }
    }

    fn on_poll_failed(&mut self, error: PollError) {
        if self.state == ConnectionState::FallbackPolling {
            self.append(LogEntryDraft::warning(format!("Polling failed: {}", error)));
        }
    }

    // === Transitions ===

    /// Start one connection attempt, superseding any prior one
    fn begin_attempt(&mut self) {
        self.cancel_tasks();
        self.generation += 1;
        self.set_state(ConnectionState::Connecting);

        let sink = TransportSink::new(self.generation, self.signal_tx.clone());
        let transport = self.collaborators.transport.clone();
        let targets = self.collaborators.targets.clone();
        let job_id = self.job_id.clone();
        debug!(%job_id, generation = self.generation, transport = transport.name(), "begin_attempt");

        self.connection_task = Some(tokio::spawn(async move {
            let target = match targets.target(&job_id).await {
                Ok(target) => target,
                Err(e) => {
                    sink.error(e).await;
                    return;
                }
            };
            match transport.run(target, sink.clone()).await {
                Ok(()) => sink.closed().await,
                Err(e) => sink.error(e).await,
            }
        }));
    }

    fn enter_open(&mut self) {
        self.attempts = 0;
        self.last_delay = None;
        self.error = None;
        self.poller.stop();
        self.set_state(ConnectionState::Open);
        self.append(LogEntryDraft::success(format!("Connected to live updates for {}", self.job_id)));
    }

    fn enter_reconnecting(&mut self, reason: String) {
        // The failed attempt is finished; nothing more from it is wanted
        self.cancel_tasks();
        self.generation += 1;
        self.attempts += 1;
        self.set_state(ConnectionState::Reconnecting);

        if self.policy.exhausted(self.attempts) {
            if self.policy.should_fallback(self.attempts) {
                self.enter_fallback(&reason);
            } else {
                self.enter_failed(&reason);
            }
            return;
        }

        let delay = self.policy.next_delay(self.attempts - 1);
        self.last_delay = Some(delay);
        warn!(
            job_id = %self.job_id,
            attempt = self.attempts,
            delay_ms = delay.as_millis() as u64,
            %reason,
            "Connection lost, scheduling reconnect"
        );
        self.append(LogEntryDraft::warning(format!(
            "Connection lost ({}). Reconnecting in {:.1}s (attempt {}/{})",
            reason,
            delay.as_secs_f64(),
            self.attempts,
            self.policy.max_attempts
        )));

        let generation = self.generation;
        let tx = self.signal_tx.clone();
        self.backoff_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Signal::BackoffElapsed { generation }).await;
        }));
    }

    fn enter_fallback(&mut self, reason: &str) {
        warn!(job_id = %self.job_id, attempts = self.attempts, %reason, "Reconnects exhausted, falling back to polling");
        self.set_state(ConnectionState::FallbackPolling);
        self.append(LogEntryDraft::warning(format!(
            "Real-time connection unavailable after {} attempts ({}). Polling every {:.1}s",
            self.attempts,
            reason,
            self.config.poll_interval().as_secs_f64()
        )));

        self.poller.start(
            self.collaborators.poll_source.clone(),
            self.job_id.clone(),
            self.config.poll_interval(),
            self.generation,
            self.signal_tx.clone(),
        );
    }

    fn enter_failed(&mut self, reason: &str) {
        let message = format!("Connection failed after {} attempts: {}", self.attempts, reason);
        warn!(job_id = %self.job_id, %message, "Connection failed");
        self.error = Some(message.clone());
        self.set_state(ConnectionState::Failed);
        self.append(LogEntryDraft::error(message));
    }

    // === Helpers ===

    /// Stop everything spawned and invalidate outstanding signals
    fn teardown(&mut self) {
        self.cancel_tasks();
        self.poller.stop();
        self.generation += 1;
    }

    fn cancel_tasks(&mut self) {
        if let Some(task) = self.backoff_task.take() {
            task.abort();
        }
        if let Some(task) = self.connection_task.take() {
            task.abort();
        }
    }

    fn set_state(&mut self, to: ConnectionState) {
        let from = self.state;
        if from == to {
            return;
        }
        debug!(job_id = %self.job_id, %from, %to, "set_state");
        self.state = to;
        self.bus.emit(FeedEvent::StateChanged {
            job_id: self.job_id.clone(),
            from,
            to,
        });
    }

    fn apply(&mut self, translation: Translation, source_id: Option<String>) {
        if let Some(mut draft) = translation.log {
            if let Some(source_id) = source_id {
                draft = draft.with_source_id(source_id);
            }
            self.append(draft);
        }
        if let Some(agent) = translation.agent {
            self.store.upsert_agent(agent.clone());
            self.bus.emit(FeedEvent::AgentUpdated {
                job_id: self.job_id.clone(),
                agent,
            });
        }
    }

    fn append(&mut self, draft: LogEntryDraft) {
        let entry = self.store.append(draft);
        self.bus.emit(FeedEvent::LogAppended {
            job_id: self.job_id.clone(),
            entry,
        });
    }

    fn publish(&self) {
        let store = self.store.snapshot();
        let snapshot = FeedSnapshot {
            job_id: self.job_id.clone(),
            state: self.state,
            error: self.error.clone(),
            reconnect_attempts: self.attempts,
            last_delay: self.last_delay,
            backoff_pending: self.backoff_task.is_some(),
            polling: self.poller.is_running(),
            poll_cursor: self.poller.cursor(),
            logs: store.logs,
            agents: store.agents,
        };
        self.snapshot_tx.send_replace(Arc::new(snapshot));
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.cancel_tasks();
    }
}
