//! Inbound message translation and outbound feed events
//!
//! Inbound, the transport delivers [`RawMessage`]s which the translator turns
//! into log drafts and agent updates. Outbound, every change the connection
//! manager applies is broadcast as a [`FeedEvent`] on the [`FeedBus`].
//!
//! # Architecture
//!
//! ```text
//!   transport ──RawMessage──▶ translate() ──Translation──▶ ConnectionManager
//!                                                              │
//!                                             EventStore ◀─────┤
//!                                                              ▼
//!                                     ┌──────────── FeedBus (broadcast) ───────────┐
//!                                     ▼                                            ▼
//!                                UI stream                                 EventRecorder
//!                                                                            (.jsonl)
//! ```

mod bus;
mod inbound;
mod recorder;
mod translator;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, FeedBus};
pub use inbound::{InboundMessage, KNOWN_TAGS, KnownMessage, MISSING_TAG, NON_OBJECT_TAG, RawMessage};
pub use recorder::{EventRecorder, read_recording, spawn_recorder};
pub use translator::{Translation, translate, translate_message};
pub use types::{FeedEvent, FeedEventEntry};
