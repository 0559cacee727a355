//! # Mirror Records
//!
//! Rows of the off-chain mirror. Counters are always copied from a freshly
//! fetched ledger account; nothing here derives them locally.

use serde::{Deserialize, Serialize};
use shared_types::{Address, Slot, TokenAmount, TxSignature, UnixTimestamp};

/// Result of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsertOutcome {
    /// A new row was written.
    Inserted,
    /// A row with the same unique key already existed; nothing changed.
    AlreadyRecorded,
    /// The session moved since the caller read it; nothing changed.
    Superseded,
}

impl InsertOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted)
    }
}

/// Mirror of a viewer session (one per viewer × content).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Ledger address of the session account.
    pub session: Address,
    /// Local content id.
    pub content_id: i64,
    pub viewer: Address,
    pub max_approved_chunks: u32,
    pub chunks_consumed: u32,
    pub total_spent: TokenAmount,
    pub approved_price_per_chunk: TokenAmount,
    pub last_paid_chunk_index: Option<u32>,
    pub session_start: UnixTimestamp,
    pub last_activity: UnixTimestamp,
    pub is_active: bool,
}

impl SessionRecord {
    /// Chunks still covered by the approval.
    pub fn chunks_remaining(&self) -> u32 {
        self.max_approved_chunks.saturating_sub(self.chunks_consumed)
    }
}

/// Approval fields refreshed when a delegation is approved again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionApproval {
    pub max_approved_chunks: u32,
    pub approved_price_per_chunk: TokenAmount,
    pub last_activity: UnixTimestamp,
}

/// Ledger-reported session counters applied after a payment.
///
/// Applied with `MAX()` so a stale snapshot can never move a counter back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionProgress {
    pub max_approved_chunks: u32,
    pub chunks_consumed: u32,
    pub total_spent: TokenAmount,
    pub last_paid_chunk_index: Option<u32>,
    pub last_activity: UnixTimestamp,
}

/// One per-chunk payment (legacy payment path).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPaymentRecord {
    pub session: Address,
    pub content_id: i64,
    pub chunk_index: u32,
    /// One-based position of the chunk, `chunk_index + 1`.
    pub sequence: u32,
    pub amount_paid: TokenAmount,
    pub platform_fee: TokenAmount,
    pub creator_amount: TokenAmount,
    pub signature: TxSignature,
    pub viewer: Address,
    /// Creator identity as known to the content directory.
    pub creator: String,
    pub paid_at: UnixTimestamp,
}

/// One batch settlement. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub session: Address,
    pub content_id: i64,
    pub viewer: Address,
    pub creator: String,
    pub chunk_count: u32,
    pub total_payment: TokenAmount,
    pub platform_fee: TokenAmount,
    pub creator_amount: TokenAmount,
    /// Globally unique; locally triggered settlements use a `local:` id.
    pub signature: TxSignature,
    pub block_time: Option<UnixTimestamp>,
    /// `None` for settlements not observed on the ledger.
    pub slot: Option<Slot>,
    pub chunks_consumed_after: u32,
    pub chunks_remaining: u32,
    pub settled_at: UnixTimestamp,
}
