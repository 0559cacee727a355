//! # Ingestion Errors

use shared_bus::ErrorKind;
use sp_01_ledger_reader::LedgerError;
use sp_02_instruction_decoder::{DecodeError, OperationKind};
use sp_03_mirror_store::StoreError;
use sp_06_settlement::SettlementError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Settlement(#[from] SettlementError),

    /// The ledger references something the mirror does not know.
    #[error("Not mirrored: {0}")]
    MirrorNotFound(String),

    #[error("{operation} has no {role} account")]
    MissingAccount {
        operation: OperationKind,
        role: &'static str,
    },

    #[error("Ingestion already running")]
    AlreadyRunning,
}

impl SyncError {
    /// Worth retrying the whole transaction next cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Ledger(e) => e.is_transient(),
            Self::Settlement(SettlementError::Ledger(e)) => e.is_transient(),
            Self::Settlement(SettlementError::Timeout(_) | SettlementError::Contention(_)) => true,
            _ => false,
        }
    }

    /// Already published by the component that raised it.
    pub fn is_reported(&self) -> bool {
        matches!(self, Self::Settlement(SettlementError::InvariantViolation(_)))
    }

    /// Classification for the `error` channel.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Ledger(LedgerError::AccountDecode { .. }) | Self::Decode(_) => ErrorKind::Decode,
            Self::Ledger(_) => ErrorKind::LedgerUnavailable,
            Self::Store(_) => ErrorKind::Storage,
            Self::MirrorNotFound(_) | Self::MissingAccount { .. } => ErrorKind::MirrorNotFound,
            Self::Settlement(e) => match e {
                SettlementError::Ledger(LedgerError::AccountDecode { .. }) => ErrorKind::Decode,
                SettlementError::Ledger(_) | SettlementError::Timeout(_) => {
                    ErrorKind::LedgerUnavailable
                }
                SettlementError::Store(_)
                | SettlementError::Overflow
                | SettlementError::Contention(_) => ErrorKind::Storage,
                SettlementError::InvariantViolation(_) => ErrorKind::InvariantViolation,
                SettlementError::ContentNotFound(_)
                | SettlementError::SessionNotFound { .. }
                | SettlementError::SessionAccountMissing(_)
                | SettlementError::InvalidViewer(_) => ErrorKind::MirrorNotFound,
            },
            Self::AlreadyRunning => ErrorKind::Storage,
        }
    }
}
