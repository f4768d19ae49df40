//! Connection lifecycle
//!
//! A [`FeedHandle`] fronts one ConnectionManager actor, which runs the state
//! machine below on a single task:
//!
//! ```text
//! Idle ──connect──▶ Connecting ──opened──▶ Open
//!                      │  ▲                  │
//!               failed │  │ delay elapsed    │ closed / error
//!                      ▼  │                  │
//!                   Reconnecting ◀───────────┘
//!                      │
//!        attempts used │── fallback on ──▶ FallbackPolling
//!                      └── fallback off ─▶ Failed
//!
//! any state except Closed ──disconnect──▶ Closed
//! any state ──reconnect──▶ Connecting (attempts reset)
//! ```

mod handle;
mod manager;
mod messages;
mod policy;
mod snapshot;

pub use handle::FeedHandle;
pub use manager::FeedCollaborators;
pub(crate) use messages::{Signal, TransportEvent};
pub use policy::ReconnectPolicy;
pub use snapshot::FeedSnapshot;
