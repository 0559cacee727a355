//! Inputs and results of reconciliation.

use serde::Serialize;
use shared_types::{Address, Slot, TxSignature, UnixTimestamp};
use sp_03_mirror_store::{ChunkPaymentRecord, SettlementRecord};

/// A settlement instruction seen on the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedSettlement {
    pub session: Address,
    pub signature: TxSignature,
    pub slot: Option<Slot>,
    pub block_time: Option<UnixTimestamp>,
}

/// A per-chunk payment instruction seen on the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedChunkPayment {
    pub session: Address,
    /// Index from the instruction data, when present.
    pub chunk_index: Option<u32>,
    pub signature: TxSignature,
    pub block_time: Option<UnixTimestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A new settlement row was written.
    Recorded(SettlementRecord),
    /// The signature was already recorded.
    AlreadyRecorded,
    /// The mirror already matches the ledger; nothing to record.
    AlreadyAbsorbed,
    /// No mirrored session to reconcile against.
    SessionUnknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkPaymentOutcome {
    Recorded(ChunkPaymentRecord),
    AlreadyRecorded,
    SessionUnknown,
}

/// Result of a client-triggered settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleOutcome {
    /// Tracker views marked settled.
    pub settled: usize,
    /// Chunks newly recorded in the mirror.
    pub chunk_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<TxSignature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks_remaining: Option<u32>,
}
