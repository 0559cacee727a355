//! # Shared Bus - Event Dispatcher for the Sync Pipeline
//!
//! A named-channel publish/subscribe bus. Ingestion handlers, the settlement
//! reconciler and the chunk view tracker publish typed [`SyncEvent`]s; logging,
//! metrics and orchestration subscribe without touching ingestion internals.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │  Ingestion   │                    │  Event log   │
//! │  Reconciler  │    publish()       │  Operators   │
//! │  Tracker     │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │          │
//!                  │              │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! Event names and payload shapes are the contract; the broadcast channel is
//! an implementation detail.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{ErrorKind, EventFilter, EventTopic, SuggestionReason, SyncEvent};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        assert_eq!(DEFAULT_CHANNEL_CAPACITY, 1024);
    }
}
