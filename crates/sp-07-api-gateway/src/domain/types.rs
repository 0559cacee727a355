//! # Request and Response Bodies

use serde::{Deserialize, Serialize};
use shared_types::{Slot, TokenAmount, TxSignature};
use sp_06_settlement::SettleOutcome;

#[derive(Debug, Clone, Deserialize)]
pub struct TrackChunkRequest {
    pub content: String,
    pub chunk: String,
    #[serde(default)]
    pub proof: String,
    #[serde(default)]
    pub viewer: Option<String>,
}

/// `content` and `viewer` query parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct PairQuery {
    pub content: String,
    #[serde(default)]
    pub viewer: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementPreview {
    pub content: String,
    pub viewer: String,
    pub unsettled_chunks: usize,
    pub price_per_chunk: TokenAmount,
    pub total_cost: TokenAmount,
    pub platform_fee: TokenAmount,
    pub creator_amount: TokenAmount,
    pub platform_fee_bps: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettleRequest {
    pub content: String,
    #[serde(default)]
    pub viewer: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    pub settled: bool,
    pub settled_views: usize,
    pub chunk_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<TxSignature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks_remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SettleResponse {
    pub fn failed(error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

impl From<SettleOutcome> for SettleResponse {
    /// `settled` reports whether anything was actually billed or drained.
    fn from(outcome: SettleOutcome) -> Self {
        Self {
            success: true,
            settled: outcome.chunk_count > 0 || outcome.settled > 0,
            settled_views: outcome.settled,
            chunk_count: outcome.chunk_count,
            signature: outcome.signature,
            chunks_remaining: outcome.chunks_remaining,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub ingestion_running: bool,
    pub watermark: Slot,
}
