//! # Settlement Errors

use std::time::Duration;

use shared_types::Address;
use sp_01_ledger_reader::LedgerError;
use sp_03_mirror_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Content not found: {0}")]
    ContentNotFound(String),

    #[error("No mirrored session for viewer {viewer} on {content}")]
    SessionNotFound { content: String, viewer: String },

    #[error("Session account {0} not found on ledger")]
    SessionAccountMissing(Address),

    #[error("Invalid viewer identity: {0}")]
    InvalidViewer(String),

    /// Ledger state contradicts the mirror. Already reported on the bus.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Payment amount overflow")]
    Overflow,

    /// Concurrent writers kept advancing the session between read and write.
    #[error("Settlement for session {0} kept racing concurrent writers")]
    Contention(Address),

    #[error("Settlement timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
