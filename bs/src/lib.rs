//! buildstream - resilient live feed for long-running multi-agent build jobs
//!
//! A [`FeedHandle`] keeps a UI informed of a server-side build job. It opens a
//! persistent channel to the job, recovers from transient failures with
//! bounded exponential backoff, degrades to periodic polling when the channel
//! cannot be sustained, and translates whatever the backend sends into a small
//! domain model held in a bounded, ordered store.
//!
//! # Core Concepts
//!
//! - **One control path**: a single actor task owns connection state and the store
//! - **Generation tokens**: late callbacks from cancelled work are dropped, never applied
//! - **Snapshots, not locks**: readers get immutable `Arc` snapshots
//! - **Total translation**: unknown or malformed input becomes a warning, never a panic
//!
//! # Modules
//!
//! - [`connection`] - State machine, backoff policy and the facade
//! - [`events`] - Inbound translation, feed event bus and JSONL recorder
//! - [`store`] - Bounded log buffer and agent map
//! - [`poller`] - Fallback polling
//! - [`transport`] - WebSocket, SSE and HTTP collaborators
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod connection;
pub mod domain;
pub mod events;
pub mod poller;
pub mod store;
pub mod transport;

// Re-export commonly used types
pub use config::{Config, FeedConfig, ServerConfig, TransportKind};
pub use connection::{FeedCollaborators, FeedHandle, FeedSnapshot, ReconnectPolicy};
pub use domain::{AgentState, AgentStatus, ConnectionState, LogEntry, LogEntryDraft, LogKind};
pub use events::{FeedBus, FeedEvent, InboundMessage, RawMessage, Translation, translate};
pub use poller::{FallbackPoller, PollError, PollSource, PolledEntry};
pub use store::{EventStore, EventStoreSnapshot};
pub use transport::{ConnectTarget, TargetProvider, Transport, TransportError, TransportSink};
