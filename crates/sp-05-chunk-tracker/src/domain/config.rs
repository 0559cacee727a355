//! Tracker configuration.

use serde::{Deserialize, Serialize};
use shared_types::TokenAmount;

/// Price assumed when the content directory has no price for an item.
pub const DEFAULT_FALLBACK_PRICE: TokenAmount = 1_000;

/// Advisory settlement triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Unsettled views per (content, viewer) that trigger a suggestion.
    pub settlement_threshold: usize,
    /// Age in seconds of the oldest unsettled view that triggers a suggestion.
    pub settlement_interval_secs: u64,
    /// How often the sweep task checks the interval trigger.
    pub sweep_interval_secs: u64,
    /// Drop settled views during the sweep.
    pub purge_settled: bool,
    /// Price per chunk used for estimates when the content is unknown.
    pub fallback_price_per_chunk: TokenAmount,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            settlement_threshold: 100,
            settlement_interval_secs: 3_600,
            sweep_interval_secs: 60,
            purge_settled: true,
            fallback_price_per_chunk: DEFAULT_FALLBACK_PRICE,
        }
    }
}
