//! # Chunk View Tracker

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use shared_bus::{EventPublisher, SuggestionReason, SyncEvent};
use shared_types::TokenAmount;
use sp_03_mirror_store::ContentDirectory;
use tracing::{debug, info, warn};

use crate::domain::{ChunkView, ContentId, SettlementStats, TrackerConfig, ViewerKey};

type TrackerKey = (ContentId, ViewerKey);

#[derive(Debug, Default)]
struct TrackerEntry {
    views: Vec<ChunkView>,
    /// Threshold suggestion already sent since the last settlement.
    threshold_suggested: bool,
    /// Last interval suggestion, to avoid repeating it every sweep.
    interval_suggested_at: Option<DateTime<Utc>>,
}

impl TrackerEntry {
    fn stats(&self, price: TokenAmount) -> SettlementStats {
        let unsettled = self.views.iter().filter(|v| !v.settled).count();
        let total = self.views.len();
        SettlementStats {
            unsettled,
            settled: total - unsettled,
            total,
            estimated_value: (unsettled as u64).saturating_mul(price),
        }
    }

    fn oldest_unsettled(&self) -> Option<DateTime<Utc>> {
        self.views
            .iter()
            .filter(|v| !v.settled)
            .map(|v| v.observed_at)
            .min()
    }
}

/// In-memory tracker of served-but-unsettled chunks.
pub struct ChunkViewTracker {
    entries: DashMap<TrackerKey, TrackerEntry>,
    content: Arc<dyn ContentDirectory>,
    bus: Arc<dyn EventPublisher>,
    config: TrackerConfig,
}

impl ChunkViewTracker {
    pub fn new(
        config: TrackerConfig,
        content: Arc<dyn ContentDirectory>,
        bus: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            entries: DashMap::new(),
            content,
            bus,
            config,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Record a served chunk and return the pair's updated stats.
    pub async fn record_view(
        &self,
        content: &ContentId,
        chunk_id: &str,
        payment_proof: &str,
        viewer: &ViewerKey,
    ) -> SettlementStats {
        self.record_view_at(content, chunk_id, payment_proof, viewer, Utc::now())
            .await
    }

    /// [`Self::record_view`] with an explicit observation time.
    pub async fn record_view_at(
        &self,
        content: &ContentId,
        chunk_id: &str,
        payment_proof: &str,
        viewer: &ViewerKey,
        observed_at: DateTime<Utc>,
    ) -> SettlementStats {
        let price = self.price_per_chunk(content);

        // Entry lock is released before publishing.
        let (stats, crossed_threshold) = {
            let mut entry = self
                .entries
                .entry((content.clone(), viewer.clone()))
                .or_default();
            entry.views.push(ChunkView {
                content: content.clone(),
                chunk_id: chunk_id.to_string(),
                viewer: viewer.clone(),
                payment_proof: payment_proof.to_string(),
                observed_at,
                settled: false,
            });
            let stats = entry.stats(price);
            let crossed =
                stats.unsettled >= self.config.settlement_threshold && !entry.threshold_suggested;
            if crossed {
                entry.threshold_suggested = true;
            }
            (stats, crossed)
        };

        debug!(
            content = %content,
            viewer = %viewer,
            chunk = chunk_id,
            unsettled = stats.unsettled,
            "[sp-05] chunk view recorded"
        );

        if crossed_threshold {
            self.suggest(content, viewer, &stats, SuggestionReason::Threshold)
                .await;
        }
        stats
    }

    pub fn unsettled_count(&self, content: &ContentId, viewer: &ViewerKey) -> usize {
        self.entries
            .get(&(content.clone(), viewer.clone()))
            .map_or(0, |entry| entry.views.iter().filter(|v| !v.settled).count())
    }

    pub fn unsettled_entries(&self, content: &ContentId, viewer: &ViewerKey) -> Vec<ChunkView> {
        self.entries
            .get(&(content.clone(), viewer.clone()))
            .map(|entry| entry.views.iter().filter(|v| !v.settled).cloned().collect())
            .unwrap_or_default()
    }

    /// Mark every unsettled view of the pair as settled. Returns how many
    /// views changed.
    pub fn mark_settled(&self, content: &ContentId, viewer: &ViewerKey) -> usize {
        let Some(mut entry) = self.entries.get_mut(&(content.clone(), viewer.clone())) else {
            return 0;
        };
        let mut marked = 0;
        for view in entry.views.iter_mut().filter(|v| !v.settled) {
            view.settled = true;
            marked += 1;
        }
        entry.threshold_suggested = false;
        entry.interval_suggested_at = None;
        if marked > 0 {
            info!(content = %content, viewer = %viewer, marked, "[sp-05] views settled");
        }
        marked
    }

    pub fn settlement_stats(&self, content: &ContentId, viewer: &ViewerKey) -> SettlementStats {
        let price = self.price_per_chunk(content);
        self.entries
            .get(&(content.clone(), viewer.clone()))
            .map(|entry| entry.stats(price))
            .unwrap_or_default()
    }

    /// Current price of a content item, or the configured fallback.
    pub fn price_per_chunk(&self, content: &ContentId) -> TokenAmount {
        match self.content.find_content_by_external_id(content.as_str()) {
            Ok(Some(record)) => record.price_per_chunk,
            Ok(None) => self.config.fallback_price_per_chunk,
            Err(e) => {
                warn!(content = %content, "[sp-05] price lookup failed: {}", e);
                self.config.fallback_price_per_chunk
            }
        }
    }

    /// Number of (content, viewer) pairs held.
    pub fn tracked_pairs(&self) -> usize {
        self.entries.len()
    }

    /// Publish interval suggestions that are due. Returns how many were sent.
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }

    /// [`Self::sweep`] at an explicit time.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let interval = Duration::from_secs(self.config.settlement_interval_secs);
        let is_due = |since: DateTime<Utc>| {
            (now - since)
                .to_std()
                .map_or(false, |age| age >= interval)
        };

        let mut due = Vec::new();
        for mut entry in self.entries.iter_mut() {
            let Some(oldest) = entry.oldest_unsettled() else {
                continue;
            };
            let recently_suggested = entry.interval_suggested_at.is_some_and(|at| !is_due(at));
            if is_due(oldest) && !recently_suggested {
                entry.interval_suggested_at = Some(now);
                due.push(entry.key().clone());
            }
        }

        for (content, viewer) in &due {
            let stats = self.settlement_stats(content, viewer);
            self.suggest(content, viewer, &stats, SuggestionReason::Interval)
                .await;
        }
        due.len()
    }

    /// Drop settled views and empty pairs. Returns how many views were removed.
    pub fn purge_settled(&self) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let before = entry.views.len();
            entry.views.retain(|v| !v.settled);
            removed += before - entry.views.len();
            !entry.views.is_empty()
        });
        if removed > 0 {
            debug!(removed, "[sp-05] purged settled views");
        }
        removed
    }

    async fn suggest(
        &self,
        content: &ContentId,
        viewer: &ViewerKey,
        stats: &SettlementStats,
        reason: SuggestionReason,
    ) {
        info!(
            content = %content,
            viewer = %viewer,
            unsettled = stats.unsettled,
            estimated_value = stats.estimated_value,
            ?reason,
            "[sp-05] settlement suggested"
        );
        self.bus
            .publish(SyncEvent::SettlementSuggested {
                content: content.to_string(),
                viewer: viewer.to_string(),
                unsettled: stats.unsettled,
                estimated_value: stats.estimated_value,
                reason,
            })
            .await;
    }
}
