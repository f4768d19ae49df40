//! EventStore - bounded log buffer plus agent map
//!
//! Single writer (the connection manager task), any number of readers via
//! immutable [`EventStoreSnapshot`]s. Ordering is by the store-assigned
//! `sequence`, never by wall-clock time.

use std::collections::{BTreeMap, HashSet, VecDeque};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{AgentStatus, LogEntry, LogEntryDraft};

/// Default log capacity
pub const DEFAULT_MAX_LOGS: usize = 100;

/// Immutable copy of the store contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventStoreSnapshot {
    /// Oldest first, at most `capacity` entries
    pub logs: Vec<LogEntry>,
    pub agents: BTreeMap<String, AgentStatus>,
}

/// Bounded, ordered log buffer and agent-status map
#[derive(Debug)]
pub struct EventStore {
    capacity: usize,
    logs: VecDeque<LogEntry>,
    agents: BTreeMap<String, AgentStatus>,
    /// Source ids of retained entries, for deduplication
    sources: HashSet<String>,
    last_sequence: u64,
}

impl EventStore {
    /// Create a store holding at most `capacity` log entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        debug!(capacity, "EventStore::new: called");
        Self {
            capacity,
            logs: VecDeque::with_capacity(capacity),
            agents: BTreeMap::new(),
            sources: HashSet::new(),
            last_sequence: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// Sequence number of the most recent append (0 if none since last clear)
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Append a draft, returning the stamped entry
    ///
    /// Evicts from the head once the buffer exceeds capacity.
    pub fn append(&mut self, draft: LogEntryDraft) -> LogEntry {
        self.last_sequence += 1;
        let entry = LogEntry::from_draft(draft, Uuid::now_v7().to_string(), self.last_sequence, Utc::now());
        debug!(sequence = entry.sequence, kind = %entry.kind, "EventStore::append");

        if let Some(source) = &entry.source_id {
            self.sources.insert(source.clone());
        }
        self.logs.push_back(entry.clone());
        self.evict_overflow();
        entry
    }

    /// Insert or overwrite an agent's status by name
    pub fn upsert_agent(&mut self, status: AgentStatus) {
        debug!(agent = %status.name, status = %status.status, "EventStore::upsert_agent");
        self.agents.insert(status.name.clone(), status);
    }

    pub fn agent(&self, name: &str) -> Option<&AgentStatus> {
        self.agents.get(name)
    }

    /// True if a retained entry carries this upstream id
    pub fn contains_source(&self, source_id: &str) -> bool {
        self.sources.contains(source_id)
    }

    /// Copy the current contents
    pub fn snapshot(&self) -> EventStoreSnapshot {
        EventStoreSnapshot {
            logs: self.logs.iter().cloned().collect(),
            agents: self.agents.clone(),
        }
    }

    /// Empty logs and agents and restart sequencing at zero
    pub fn clear(&mut self) {
        debug!("EventStore::clear: called");
        self.logs.clear();
        self.sources.clear();
        self.agents.clear();
        self.last_sequence = 0;
    }

    /// Empty the log buffer only; agents and sequencing are kept
    pub fn clear_logs(&mut self) {
        debug!("EventStore::clear_logs: called");
        self.logs.clear();
        self.sources.clear();
    }

    /// Change capacity, evicting the oldest entries if shrinking
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        debug!(capacity = self.capacity, "EventStore::set_capacity");
        self.evict_overflow();
    }

    fn evict_overflow(&mut self) {
        while self.logs.len() > self.capacity {
            if let Some(evicted) = self.logs.pop_front()
                && let Some(source) = evicted.source_id
            {
                self.sources.remove(&source);
            }
        }
    }
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LOGS)
    }
}
