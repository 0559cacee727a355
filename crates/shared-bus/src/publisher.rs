//! # Event Publisher

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::events::{EventFilter, EventTopic, SyncEvent};
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;

/// Publishing side of the bus, as seen by handlers, the reconciler and the
/// tracker.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event. Returns how many subscribers were live.
    async fn publish(&self, event: SyncEvent) -> usize;

    /// Events published since startup, delivered or not.
    fn events_published(&self) -> u64;
}

/// Topics with their own counter. `All` is a filter wildcard, never an
/// event's topic.
const COUNTED_TOPICS: [EventTopic; 6] = [
    EventTopic::Lifecycle,
    EventTopic::Content,
    EventTopic::Sessions,
    EventTopic::Payments,
    EventTopic::Tracker,
    EventTopic::Errors,
];

fn topic_slot(topic: EventTopic) -> Option<usize> {
    COUNTED_TOPICS.iter().position(|t| *t == topic)
}

/// Process-local bus over `tokio::sync::broadcast`.
///
/// Slow subscribers lag and lose the oldest events; publishers never block.
pub struct InMemoryEventBus {
    sender: broadcast::Sender<SyncEvent>,
    per_topic: [AtomicU64; COUNTED_TOPICS.len()],
    capacity: usize,
}

impl InMemoryEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            per_topic: Default::default(),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to events matching `filter`. Only events published after
    /// this call are delivered.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        debug!(topics = ?filter.topics, names = ?filter.names, "[bus] subscription opened");
        Subscription::new(self.sender.subscribe(), filter)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events published on one topic. `EventTopic::All` sums every topic.
    #[must_use]
    pub fn published_on(&self, topic: EventTopic) -> u64 {
        match topic_slot(topic) {
            Some(slot) => self.per_topic[slot].load(Ordering::Relaxed),
            None => self.events_published(),
        }
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: SyncEvent) -> usize {
        let name = event.name();
        if let Some(slot) = topic_slot(event.topic()) {
            self.per_topic[slot].fetch_add(1, Ordering::Relaxed);
        }

        match self.sender.send(event) {
            Ok(receivers) => {
                trace!(event = name, receivers, "[bus] event published");
                receivers
            }
            Err(_) => {
                trace!(event = name, "[bus] event had no subscribers");
                0
            }
        }
    }

    fn events_published(&self) -> u64 {
        self.per_topic
            .iter()
            .map(|count| count.load(Ordering::Relaxed))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ErrorKind;

    fn error_event() -> SyncEvent {
        SyncEvent::Error {
            kind: ErrorKind::Decode,
            message: "bad opcode".into(),
            signature: None,
        }
    }

    #[tokio::test]
    async fn test_unheard_events_still_count() {
        let bus = InMemoryEventBus::new();
        assert_eq!(bus.publish(SyncEvent::Stopped { watermark: 1 }).await, 0);
        assert_eq!(bus.events_published(), 1);
    }

    #[tokio::test]
    async fn test_every_subscriber_hears_each_event() {
        let bus = InMemoryEventBus::new();
        let _log = bus.subscribe(EventFilter::all());
        let _errors = bus.subscribe(EventFilter::topics(vec![EventTopic::Errors]));

        // Delivery is to the channel; filtering happens on receive.
        assert_eq!(bus.publish(error_event()).await, 2);
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_counts_per_topic() {
        let bus = InMemoryEventBus::new();
        bus.publish(SyncEvent::Stopped { watermark: 1 }).await;
        bus.publish(error_event()).await;
        bus.publish(error_event()).await;

        assert_eq!(bus.published_on(EventTopic::Errors), 2);
        assert_eq!(bus.published_on(EventTopic::Lifecycle), 1);
        assert_eq!(bus.published_on(EventTopic::Payments), 0);
        assert_eq!(bus.published_on(EventTopic::All), 3);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        assert_eq!(InMemoryEventBus::with_capacity(0).capacity(), 1);
        assert_eq!(InMemoryEventBus::with_capacity(50).capacity(), 50);
    }
}
