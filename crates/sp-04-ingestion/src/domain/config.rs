//! # Ingestion Configuration

use serde::{Deserialize, Serialize};

/// Poll loop and live feed settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Seconds between poll cycles.
    pub poll_interval_secs: u64,
    /// Try the live feed in addition to polling.
    pub subscription_enabled: bool,
    /// Fetch attempts per signature before it is given up.
    pub max_retry_attempts: u32,
    /// Seconds to wait before re-opening a dropped or refused live feed.
    pub resubscribe_backoff_secs: u64,
    /// Signatures requested per poll cycle.
    pub signature_page_size: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            subscription_enabled: true,
            max_retry_attempts: 5,
            resubscribe_backoff_secs: 15,
            signature_page_size: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IngestionConfig::default();
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.max_retry_attempts, 5);
        assert!(config.subscription_enabled);
    }
}
