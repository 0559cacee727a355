//! # Background Tasks
//!
//! Long-running loops spawned by the runtime. Each one exits when the
//! shutdown flag flips.

use std::sync::Arc;
use std::time::Duration;

use shared_bus::{Subscription, SyncEvent};
use sp_05_chunk_tracker::ChunkViewTracker;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Write every bus event to the log.
pub async fn log_events(mut events: Subscription, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => log_event(&event),
                None => break,
            },
            _ = shutdown.changed() => break,
        }
    }
    if events.lagged() > 0 {
        warn!(lost = events.lagged(), "[runtime] event log fell behind");
    }
}

fn log_event(event: &SyncEvent) {
    match event {
        SyncEvent::Error {
            kind,
            message,
            signature,
        } => warn!(
            event = event.name(),
            ?kind,
            signature = ?signature.as_ref().map(|s| s.as_str()),
            "[runtime] {}",
            message
        ),
        other => {
            let payload = serde_json::to_string(other).unwrap_or_default();
            info!(event = other.name(), "[runtime] {}", payload);
        }
    }
}

/// Run the tracker's interval trigger and purge settled views.
pub async fn sweep_tracker(tracker: Arc<ChunkViewTracker>, mut shutdown: watch::Receiver<bool>) {
    let period = Duration::from_secs(tracker.config().sweep_interval_secs.max(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let suggested = tracker.sweep().await;
                let purged = if tracker.config().purge_settled {
                    tracker.purge_settled()
                } else {
                    0
                };
                debug!(
                    suggested,
                    purged,
                    pairs = tracker.tracked_pairs(),
                    "[runtime] tracker sweep"
                );
            }
            _ = shutdown.changed() => {
                info!("[runtime] tracker sweep stopping");
                return;
            }
        }
    }
}
