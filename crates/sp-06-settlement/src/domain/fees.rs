//! # Fee Split

use shared_types::TokenAmount;

/// Basis points in 100%.
pub const BASIS_POINTS: u64 = 10_000;

/// Platform fee applied when nothing else is configured (2.5%).
pub const DEFAULT_PLATFORM_FEE_BPS: u16 = 250;

/// A payment divided between platform and creator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplit {
    pub total: TokenAmount,
    pub platform_fee: TokenAmount,
    pub creator_amount: TokenAmount,
}

/// Single platform fee rate for both payment paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeePolicy {
    platform_fee_bps: u16,
}

impl FeePolicy {
    /// Rates above 100% are clamped.
    pub fn new(platform_fee_bps: u16) -> Self {
        Self {
            platform_fee_bps: platform_fee_bps.min(BASIS_POINTS as u16),
        }
    }

    pub fn platform_fee_bps(&self) -> u16 {
        self.platform_fee_bps
    }

    /// Split `total`: the fee rounds down, the creator gets the remainder.
    pub fn split(&self, total: TokenAmount) -> FeeSplit {
        let fee = u128::from(total) * u128::from(self.platform_fee_bps) / u128::from(BASIS_POINTS);
        // fee <= total, so the narrowing cannot truncate.
        let platform_fee = fee as TokenAmount;
        FeeSplit {
            total,
            platform_fee,
            creator_amount: total - platform_fee,
        }
    }

    /// Split `chunk_count × price`. `None` on overflow.
    pub fn batch(&self, chunk_count: u32, price_per_chunk: TokenAmount) -> Option<FeeSplit> {
        let total = u64::from(chunk_count).checked_mul(price_per_chunk)?;
        Some(self.split(total))
    }
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_PLATFORM_FEE_BPS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_split() {
        let split = FeePolicy::default().split(40_000);
        assert_eq!(split.platform_fee, 1_000);
        assert_eq!(split.creator_amount, 39_000);
    }

    #[test]
    fn test_fee_rounds_down() {
        let split = FeePolicy::new(250).split(39);
        assert_eq!(split.platform_fee, 0);
        assert_eq!(split.creator_amount, 39);
    }

    #[test]
    fn test_batch_overflow() {
        assert!(FeePolicy::default().batch(u32::MAX, u64::MAX).is_none());
    }

    #[test]
    fn test_rate_is_clamped() {
        let policy = FeePolicy::new(20_000);
        assert_eq!(policy.platform_fee_bps(), 10_000);
        assert_eq!(policy.split(500).creator_amount, 0);
    }
}
