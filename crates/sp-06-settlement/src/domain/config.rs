//! Settlement configuration.

use serde::{Deserialize, Serialize};

use super::fees::DEFAULT_PLATFORM_FEE_BPS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Platform fee in basis points, applied to batch and per-chunk payments.
    pub platform_fee_bps: u16,
    /// Upper bound on ledger reads for a client-triggered settlement.
    pub client_settle_timeout_secs: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            platform_fee_bps: DEFAULT_PLATFORM_FEE_BPS,
            client_settle_timeout_secs: 10,
        }
    }
}
