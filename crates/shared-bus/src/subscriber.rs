//! # Event Subscriber

use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

use crate::events::{EventFilter, SyncEvent};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("Event bus closed")]
    Closed,
}

/// Receiving handle on the bus. Dropping it unsubscribes.
pub struct Subscription {
    receiver: broadcast::Receiver<SyncEvent>,
    filter: EventFilter,
    /// Events lost because this subscriber fell behind.
    lagged: u64,
}

impl Subscription {
    pub(crate) fn new(receiver: broadcast::Receiver<SyncEvent>, filter: EventFilter) -> Self {
        Self {
            receiver,
            filter,
            lagged: 0,
        }
    }

    /// Next matching event, or `None` once the bus is dropped.
    ///
    /// Lag is absorbed: lost events are counted and receiving continues with
    /// the oldest event still buffered.
    pub async fn recv(&mut self) -> Option<SyncEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(lost)) => self.note_lag(lost),
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// [`Self::recv`] bounded by `limit`. `None` on timeout or close.
    pub async fn recv_timeout(&mut self, limit: Duration) -> Option<SyncEvent> {
        tokio::time::timeout(limit, self.recv()).await.ok().flatten()
    }

    /// Next matching event if one is already buffered.
    pub fn try_recv(&mut self) -> Result<Option<SyncEvent>, SubscriptionError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Ok(Some(event)),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(lost)) => self.note_lag(lost),
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
            }
        }
    }

    /// Every matching event currently buffered.
    pub fn drain(&mut self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(Some(event)) = self.try_recv() {
            events.push(event);
        }
        events
    }

    /// Events this subscriber has lost to lag so far.
    #[must_use]
    pub fn lagged(&self) -> u64 {
        self.lagged
    }

    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    fn note_lag(&mut self, lost: u64) {
        self.lagged += lost;
        warn!(lost, total = self.lagged, "[bus] subscriber lagged, events dropped");
    }
}
