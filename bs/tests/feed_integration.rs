//! Integration tests for the job feed
//!
//! These drive a real FeedHandle against scripted transports and poll
//! sources, observing it only through snapshots and the event stream.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;

use buildstream::events::read_recording;
use buildstream::events::spawn_recorder;
use buildstream::{
    ConnectTarget, ConnectionState, FeedCollaborators, FeedConfig, FeedEvent, FeedHandle, FeedSnapshot, LogKind,
    PollError, PollSource, PolledEntry, RawMessage, TargetProvider, Transport, TransportError, TransportSink,
};

const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Doubles
// =============================================================================

/// How a scripted connection attempt ends after opening
#[derive(Clone, Copy)]
enum End {
    Hang,
    Close,
}

/// One scripted connection attempt
#[derive(Clone)]
enum Attempt {
    Fail,
    Open { messages: Vec<Value>, end: End },
    Hang,
}

/// Plays a queue of attempts, then repeats `fallback`
struct ScriptedTransport {
    script: Mutex<VecDeque<Attempt>>,
    fallback: Attempt,
    attempts: AtomicUsize,
    targets: Mutex<Vec<String>>,
    sinks: Mutex<Vec<TransportSink>>,
}

impl ScriptedTransport {
    fn new(script: Vec<Attempt>, fallback: Attempt) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            attempts: AtomicUsize::new(0),
            targets: Mutex::new(Vec::new()),
            sinks: Mutex::new(Vec::new()),
        })
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn targets(&self) -> Vec<String> {
        self.targets.lock().unwrap().clone()
    }

    fn last_sink(&self) -> Option<TransportSink> {
        self.sinks.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn run(&self, target: ConnectTarget, sink: TransportSink) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.targets.lock().unwrap().push(target.url.clone());
        self.sinks.lock().unwrap().push(sink.clone());

        let attempt = self.script.lock().unwrap().pop_front().unwrap_or_else(|| self.fallback.clone());
        match attempt {
            Attempt::Fail => Err(TransportError::Connect("connection refused".to_string())),
            Attempt::Hang => std::future::pending().await,
            Attempt::Open { messages, end } => {
                sink.opened().await;
                for message in messages {
                    sink.message(RawMessage::new(message)).await;
                }
                match end {
                    End::Hang => std::future::pending().await,
                    End::Close => Ok(()),
                }
            }
        }
    }
}

struct JobTargets;

#[async_trait]
impl TargetProvider for JobTargets {
    async fn target(&self, job_id: &str) -> Result<ConnectTarget, TransportError> {
        Ok(ConnectTarget::new(format!("ws://backend/ws/projects/{}", job_id)).with_token("t"))
    }
}

/// Serves a fixed list, honouring the cursor
struct ListSource {
    entries: Vec<PolledEntry>,
    calls: AtomicUsize,
}

impl ListSource {
    fn new(entries: Vec<PolledEntry>) -> Arc<Self> {
        Arc::new(Self {
            entries,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl PollSource for ListSource {
    async fn fetch_since(&self, _job_id: &str, cursor: Option<&str>) -> Result<Vec<PolledEntry>, PollError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let start = cursor
            .and_then(|c| self.entries.iter().position(|e| e.id == c))
            .map_or(0, |idx| idx + 1);
        Ok(self.entries[start..].to_vec())
    }
}

/// Fails the first `failures` fetches, then serves a fixed list
struct FlakySource {
    failures: usize,
    entries: Vec<PolledEntry>,
    calls: AtomicUsize,
}

#[async_trait]
impl PollSource for FlakySource {
    async fn fetch_since(&self, _job_id: &str, cursor: Option<&str>) -> Result<Vec<PolledEntry>, PollError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(PollError::Status {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        let start = cursor
            .and_then(|c| self.entries.iter().position(|e| e.id == c))
            .map_or(0, |idx| idx + 1);
        Ok(self.entries[start..].to_vec())
    }
}

fn polled(id: &str, message: &str) -> PolledEntry {
    PolledEntry::new(
        id,
        RawMessage::new(json!({"type": "workflow_log", "level": "info", "message": message})),
    )
}

fn fast_config() -> FeedConfig {
    FeedConfig {
        initial_delay_ms: 5,
        max_delay_ms: 20,
        poll_interval_ms: 50,
        auto_connect: false,
        ..Default::default()
    }
}

fn spawn_feed(config: FeedConfig, transport: Arc<ScriptedTransport>, source: Arc<ListSource>) -> FeedHandle {
    let collaborators = FeedCollaborators {
        transport,
        targets: Arc::new(JobTargets),
        poll_source: source,
    };
    FeedHandle::spawn("job-1", config, collaborators)
}

async fn wait_for(feed: &FeedHandle, what: &str, predicate: impl FnMut(&FeedSnapshot) -> bool) -> Arc<FeedSnapshot> {
    match feed.wait_for(WAIT, predicate).await {
        Some(snapshot) => snapshot,
        None => panic!("timed out waiting for {}: last snapshot {:?}", what, feed.snapshot()),
    }
}

async fn wait_until_attempts(transport: &ScriptedTransport, attempts: usize) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while transport.attempts() < attempts {
        assert!(tokio::time::Instant::now() < deadline, "transport reached only {} attempts", transport.attempts());
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn drain_states(rx: &mut tokio::sync::broadcast::Receiver<FeedEvent>) -> Vec<ConnectionState> {
    let mut states = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let FeedEvent::StateChanged { to, .. } = event {
            states.push(to);
        }
    }
    states
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_happy_path_opens_with_success_log() {
    let transport = ScriptedTransport::new(
        vec![Attempt::Open {
            messages: vec![json!({"type": "connection_established"})],
            end: End::Hang,
        }],
        Attempt::Hang,
    );
    let feed = spawn_feed(fast_config(), transport.clone(), ListSource::new(vec![]));

    assert_eq!(feed.state(), ConnectionState::Idle);
    feed.connect().await;

    let snapshot = wait_for(&feed, "open with two logs", |s| s.state == ConnectionState::Open && s.logs.len() == 2).await;
    assert!(snapshot.is_connected());
    assert_eq!(snapshot.logs[0].kind, LogKind::Success);
    assert_eq!(snapshot.logs[1].message, "Real-time updates active");
    assert_eq!(snapshot.reconnect_attempts, 0);
    assert!(snapshot.error.is_none());
    assert_eq!(transport.targets(), vec!["ws://backend/ws/projects/job-1".to_string()]);
}

#[tokio::test]
async fn test_recoverable_drop_schedules_initial_delay() {
    let config = FeedConfig {
        initial_delay_ms: 1_000,
        max_delay_ms: 30_000,
        auto_connect: false,
        ..Default::default()
    };
    let transport = ScriptedTransport::new(
        vec![Attempt::Open {
            messages: vec![],
            end: End::Close,
        }],
        Attempt::Hang,
    );
    let feed = spawn_feed(config, transport, ListSource::new(vec![]));
    feed.connect().await;

    let snapshot = wait_for(&feed, "reconnecting", |s| s.state == ConnectionState::Reconnecting).await;
    assert_eq!(snapshot.reconnect_attempts, 1);
    assert_eq!(snapshot.last_delay, Some(Duration::from_millis(1_000)));
    assert!(snapshot.backoff_pending);
    assert!(snapshot.is_connecting());

    let last = snapshot.logs.last().unwrap();
    assert_eq!(last.kind, LogKind::Warning);

    feed.disconnect().await;
}

#[tokio::test]
async fn test_counter_resets_on_open() {
    let transport = ScriptedTransport::new(
        vec![
            Attempt::Fail,
            Attempt::Fail,
            Attempt::Open {
                messages: vec![],
                end: End::Hang,
            },
        ],
        Attempt::Hang,
    );
    let feed = spawn_feed(fast_config(), transport.clone(), ListSource::new(vec![]));
    let mut events = feed.subscribe_events();
    feed.connect().await;

    let snapshot = wait_for(&feed, "open", |s| s.state == ConnectionState::Open).await;
    assert_eq!(snapshot.reconnect_attempts, 0);
    assert!(snapshot.last_delay.is_none());
    assert_eq!(transport.attempts(), 3);

    let states = drain_states(&mut events);
    assert_eq!(
        states,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Reconnecting,
            ConnectionState::Connecting,
            ConnectionState::Reconnecting,
            ConnectionState::Connecting,
            ConnectionState::Open,
        ]
    );
}

#[tokio::test]
async fn test_fallback_after_max_attempts() {
    let transport = ScriptedTransport::new(vec![], Attempt::Fail);
    let source = ListSource::new(vec![polled("1", "one"), polled("2", "two"), polled("3", "three")]);
    let feed = spawn_feed(fast_config(), transport.clone(), source.clone());
    let mut events = feed.subscribe_events();
    feed.connect().await;

    let snapshot = wait_for(&feed, "three polled entries", |s| {
        s.state == ConnectionState::FallbackPolling && s.logs.iter().filter(|e| e.source_id.is_some()).count() == 3
    })
    .await;

    assert!(snapshot.is_using_fallback());
    assert!(snapshot.polling);
    assert!(!snapshot.backoff_pending);
    assert_eq!(snapshot.reconnect_attempts, 5);
    assert_eq!(snapshot.poll_cursor.as_deref(), Some("3"));
    assert_eq!(transport.attempts(), 5);

    let polled: Vec<_> = snapshot.logs.iter().filter(|e| e.source_id.is_some()).collect();
    let messages: Vec<_> = polled.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(messages, vec!["one", "two", "three"]);
    for pair in polled.windows(2) {
        assert!(pair[0].sequence < pair[1].sequence);
    }

    // Several more ticks: no duplicates, no further connection attempts
    tokio::time::sleep(Duration::from_millis(200)).await;
    let later = feed.snapshot();
    assert_eq!(later.state, ConnectionState::FallbackPolling);
    assert_eq!(later.logs.iter().filter(|e| e.source_id.is_some()).count(), 3);
    assert_eq!(transport.attempts(), 5);
    assert!(source.calls.load(Ordering::SeqCst) >= 2);

    let states = drain_states(&mut events);
    assert_eq!(
        states.iter().filter(|s| **s == ConnectionState::FallbackPolling).count(),
        1
    );
    assert_eq!(
        states.iter().filter(|s| **s == ConnectionState::Reconnecting).count(),
        5
    );

    feed.disconnect().await;
    assert!(!feed.snapshot().polling);
}

#[tokio::test]
async fn test_poll_failures_warn_and_keep_polling() {
    let transport = ScriptedTransport::new(vec![], Attempt::Fail);
    let source = Arc::new(FlakySource {
        failures: 2,
        entries: vec![polled("1", "one"), polled("2", "two")],
        calls: AtomicUsize::new(0),
    });
    let collaborators = FeedCollaborators {
        transport,
        targets: Arc::new(JobTargets),
        poll_source: source.clone(),
    };
    let feed = FeedHandle::spawn("job-1", fast_config(), collaborators);
    feed.connect().await;

    let snapshot = wait_for(&feed, "polled entries after failures", |s| {
        s.logs.iter().filter(|e| e.source_id.is_some()).count() == 2
    })
    .await;

    assert_eq!(snapshot.state, ConnectionState::FallbackPolling);
    assert!(snapshot.polling);
    assert!(snapshot.error.is_none());
    assert_eq!(snapshot.poll_cursor.as_deref(), Some("2"));

    let failures: Vec<_> = snapshot
        .logs
        .iter()
        .filter(|e| e.kind == LogKind::Warning && e.message.starts_with("Polling failed"))
        .collect();
    assert_eq!(failures.len(), 2);

    // Failure warnings come before the entries from the recovered ticks
    let first_polled = snapshot.logs.iter().find(|e| e.source_id.is_some()).unwrap();
    assert!(failures.iter().all(|e| e.sequence < first_polled.sequence));
    assert!(source.calls.load(Ordering::SeqCst) >= 3);

    feed.disconnect().await;
}

#[tokio::test]
async fn test_invalid_config_falls_back_to_defaults() {
    let config = FeedConfig {
        jitter: f64::NAN,
        poll_interval_ms: 0,
        auto_connect: false,
        ..fast_config()
    };
    let transport = ScriptedTransport::new(vec![], Attempt::Fail);
    let feed = spawn_feed(config, transport, ListSource::new(vec![]));
    feed.connect().await;

    // The default policy applies: first retry waits the default initial delay
    let snapshot = wait_for(&feed, "reconnecting", |s| s.state == ConnectionState::Reconnecting).await;
    assert_eq!(snapshot.reconnect_attempts, 1);
    assert_eq!(snapshot.last_delay, Some(Duration::from_millis(1_000)));

    feed.disconnect().await;
    assert_eq!(feed.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_terminal_failure_without_fallback() {
    let config = FeedConfig {
        enable_fallback: false,
        max_reconnect_attempts: 3,
        ..fast_config()
    };
    let transport = ScriptedTransport::new(vec![], Attempt::Fail);
    let feed = spawn_feed(config, transport.clone(), ListSource::new(vec![polled("1", "x")]));
    feed.connect().await;

    let snapshot = wait_for(&feed, "failed", |s| s.state == ConnectionState::Failed).await;
    assert!(snapshot.error.is_some());
    assert_eq!(feed.error(), snapshot.error);
    assert!(!snapshot.polling);
    assert!(!snapshot.backoff_pending);
    assert_eq!(snapshot.logs.last().unwrap().kind, LogKind::Error);

    // Nothing moves afterwards
    tokio::time::sleep(Duration::from_millis(150)).await;
    let later = feed.snapshot();
    assert_eq!(later.state, ConnectionState::Failed);
    assert_eq!(later.logs.len(), snapshot.logs.len());
    assert_eq!(transport.attempts(), 3);

    // connect() does not leave a terminal state
    feed.connect().await;
    assert_eq!(feed.state(), ConnectionState::Failed);
}

#[tokio::test]
async fn test_disconnect_is_idempotent_and_drops_stale_callbacks() {
    let transport = ScriptedTransport::new(vec![], Attempt::Hang);
    let feed = spawn_feed(fast_config(), transport.clone(), ListSource::new(vec![]));
    feed.connect().await;

    // Wait for the attempt to reach the transport so its sink can be captured
    wait_until_attempts(&transport, 1).await;
    let sink = transport.last_sink().unwrap();

    feed.disconnect().await;
    assert_eq!(feed.state(), ConnectionState::Closed);
    feed.disconnect().await;
    assert_eq!(feed.state(), ConnectionState::Closed);
    let logs_before = feed.logs().len();

    // A late report from the cancelled attempt
    sink.opened().await;
    sink.message(RawMessage::new(json!({"type": "project_started", "project": "late"})))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(feed.state(), ConnectionState::Closed);
    assert_eq!(feed.logs().len(), logs_before);
    assert!(!feed.is_connected());
}

#[tokio::test]
async fn test_forced_reconnect_from_fallback() {
    let mut script = vec![Attempt::Fail; 5];
    script.push(Attempt::Hang);
    let transport = ScriptedTransport::new(script, Attempt::Hang);
    let feed = spawn_feed(fast_config(), transport.clone(), ListSource::new(vec![polled("1", "one")]));
    feed.connect().await;

    wait_for(&feed, "fallback with cursor", |s| {
        s.state == ConnectionState::FallbackPolling && s.poll_cursor.is_some()
    })
    .await;

    feed.reconnect().await;
    let snapshot = feed.snapshot();
    assert_eq!(snapshot.state, ConnectionState::Connecting);
    assert_eq!(snapshot.reconnect_attempts, 0);
    assert!(!snapshot.polling);
    assert!(!snapshot.backoff_pending);

    // Cursor is kept for the next fallback period
    assert_eq!(snapshot.poll_cursor.as_deref(), Some("1"));
}

#[tokio::test]
async fn test_reconnect_leaves_failed() {
    let config = FeedConfig {
        enable_fallback: false,
        max_reconnect_attempts: 1,
        ..fast_config()
    };
    let transport = ScriptedTransport::new(
        vec![
            Attempt::Fail,
            Attempt::Open {
                messages: vec![],
                end: End::Hang,
            },
        ],
        Attempt::Hang,
    );
    let feed = spawn_feed(config, transport, ListSource::new(vec![]));
    feed.connect().await;
    wait_for(&feed, "failed", |s| s.state == ConnectionState::Failed).await;

    feed.reconnect().await;
    let snapshot = wait_for(&feed, "open", |s| s.state == ConnectionState::Open).await;
    assert!(snapshot.error.is_none());
}

#[tokio::test]
async fn test_dropping_every_handle_tears_down() {
    let transport = ScriptedTransport::new(vec![], Attempt::Hang);
    let feed = spawn_feed(fast_config(), transport, ListSource::new(vec![]));
    let other = feed.clone();
    feed.connect().await;

    let mut snapshots = feed.subscribe();
    drop(feed);
    assert_eq!(other.state(), ConnectionState::Connecting);
    drop(other);

    let closed = tokio::time::timeout(WAIT, snapshots.wait_for(|s| s.state == ConnectionState::Closed)).await;
    assert!(matches!(closed, Ok(Ok(_))));
}

#[tokio::test]
async fn test_auto_connect() {
    let transport = ScriptedTransport::new(
        vec![Attempt::Open {
            messages: vec![],
            end: End::Hang,
        }],
        Attempt::Hang,
    );
    let config = FeedConfig {
        auto_connect: true,
        ..fast_config()
    };
    let feed = spawn_feed(config, transport, ListSource::new(vec![]));

    wait_for(&feed, "open", |s| s.is_connected()).await;
}

// =============================================================================
// Store through the facade
// =============================================================================

#[tokio::test]
async fn test_messages_update_logs_and_agents() {
    let transport = ScriptedTransport::new(
        vec![Attempt::Open {
            messages: vec![
                json!({"type": "agent_status_update", "agent": "frontend", "status": "working", "progress": 30}),
                json!({"type": "agent_status_update", "agent": "frontend", "status": "completed", "progress": 100}),
                json!({"type": "mystery"}),
                json!({"type": "project_progress", "progress": "lots"}),
            ],
            end: End::Hang,
        }],
        Attempt::Hang,
    );
    let feed = spawn_feed(fast_config(), transport, ListSource::new(vec![]));
    feed.connect().await;

    let snapshot = wait_for(&feed, "all messages", |s| s.logs.len() == 5).await;
    let agents = feed.agents();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents["frontend"].progress, 100);

    assert_eq!(snapshot.logs[1].kind, LogKind::AgentStatus);
    assert_eq!(snapshot.logs[3].message, "Unknown message type: mystery");
    assert_eq!(snapshot.logs[3].kind, LogKind::Warning);
    assert_eq!(snapshot.logs[4].kind, LogKind::Warning);
}

#[tokio::test]
async fn test_clear_logs_keeps_agents() {
    let transport = ScriptedTransport::new(
        vec![Attempt::Open {
            messages: vec![json!({"type": "agent_status_update", "agent": "qa", "status": "working"})],
            end: End::Hang,
        }],
        Attempt::Hang,
    );
    let feed = spawn_feed(fast_config(), transport, ListSource::new(vec![]));
    feed.connect().await;
    wait_for(&feed, "agent", |s| !s.agents.is_empty()).await;

    feed.clear_logs().await;
    assert!(feed.logs().is_empty());
    assert_eq!(feed.agents().len(), 1);
    assert!(feed.is_connected());
}

#[tokio::test]
async fn test_bounded_log_buffer() {
    let messages = (0..30)
        .map(|i| json!({"type": "workflow_log", "message": format!("line {}", i)}))
        .collect();
    let transport = ScriptedTransport::new(
        vec![Attempt::Open {
            messages,
            end: End::Hang,
        }],
        Attempt::Hang,
    );
    let config = FeedConfig {
        max_logs: 10,
        ..fast_config()
    };
    let feed = spawn_feed(config, transport, ListSource::new(vec![]));
    feed.connect().await;

    let snapshot = wait_for(&feed, "last line", |s| s.logs.last().is_some_and(|e| e.message == "line 29")).await;
    assert_eq!(snapshot.logs.len(), 10);
    assert_eq!(snapshot.logs[0].message, "line 20");
}

#[tokio::test]
async fn test_switch_job_clears_and_reconnects() {
    let transport = ScriptedTransport::new(
        vec![Attempt::Open {
            messages: vec![json!({"type": "agent_status_update", "agent": "qa", "status": "working"})],
            end: End::Hang,
        }],
        Attempt::Hang,
    );
    let feed = spawn_feed(fast_config(), transport.clone(), ListSource::new(vec![]));
    let mut events = feed.subscribe_events();
    feed.connect().await;
    wait_for(&feed, "agent", |s| !s.agents.is_empty()).await;

    feed.switch_job("job-2").await;
    let snapshot = feed.snapshot();
    assert_eq!(snapshot.job_id, "job-2");
    assert!(snapshot.logs.is_empty());
    assert!(snapshot.agents.is_empty());
    assert_eq!(snapshot.state, ConnectionState::Connecting);

    wait_until_attempts(&transport, 2).await;
    assert_eq!(transport.targets()[1], "ws://backend/ws/projects/job-2");

    let mut switched = false;
    while let Ok(event) = events.try_recv() {
        if let FeedEvent::JobSwitched { job_id, previous } = event {
            assert_eq!(job_id, "job-2");
            assert_eq!(previous, "job-1");
            switched = true;
        }
    }
    assert!(switched);
}

// =============================================================================
// Recording
// =============================================================================

#[tokio::test]
async fn test_record_session_to_jsonl() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("session.jsonl");

    let transport = ScriptedTransport::new(
        vec![Attempt::Open {
            messages: vec![json!({"type": "project_started", "project": "demo"})],
            end: End::Hang,
        }],
        Attempt::Hang,
    );
    let feed = spawn_feed(fast_config(), transport, ListSource::new(vec![]));
    let recorder = spawn_recorder(&path, feed.subscribe_events()).unwrap();

    feed.connect().await;
    wait_for(&feed, "project started", |s| s.logs.len() == 2).await;
    feed.disconnect().await;
    drop(feed);

    let written = tokio::time::timeout(WAIT, recorder).await.unwrap().unwrap();
    let entries = read_recording(&path).unwrap();
    assert_eq!(entries.len(), written);

    let types: Vec<_> = entries.iter().map(|e| e.event.event_type()).collect();
    assert_eq!(types.first(), Some(&"StateChanged"));
    assert_eq!(types.iter().filter(|t| **t == "LogAppended").count(), 2);
    assert_eq!(types.last(), Some(&"StateChanged"));
}
