//! Domain types for buildstream
//!
//! Core domain types: LogEntry, AgentStatus, ConnectionState.
//! Everything a consuming UI reads is expressed in these types; raw protocol
//! messages never leak past the translator.

mod agent;
mod log;
mod state;

pub use agent::{AgentState, AgentStatus};
pub use log::{LogEntry, LogEntryDraft, LogKind, clamp_progress};
pub use state::ConnectionState;
