//! Feed Bus - pub/sub for feed activity
//!
//! The FeedBus uses a tokio broadcast channel to push every change the
//! connection manager makes to any number of live consumers (UI, recorder).
//! Snapshots remain the source of truth; the bus is a convenience stream.

use tokio::sync::broadcast;
use tracing::debug;

use super::types::FeedEvent;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1_024;

/// Broadcast bus for feed events
#[derive(Clone)]
pub struct FeedBus {
    tx: broadcast::Sender<FeedEvent>,
}

impl FeedBus {
    /// Create a new bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "FeedBus::new: creating feed bus");
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Create a new bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the event is dropped, and slow
    /// subscribers lag rather than block the emitter.
    pub fn emit(&self, event: FeedEvent) {
        debug!(event_type = event.event_type(), job_id = event.job_id(), "FeedBus::emit");
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        debug!("FeedBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for FeedBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
