//! # Error Types
//!
//! Defines error types used across subsystems.

use thiserror::Error;

/// Errors produced when parsing ledger primitives from their text form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Input is not valid base58.
    #[error("Invalid base58: {0}")]
    InvalidBase58(String),

    /// Decoded address has the wrong length.
    #[error("Invalid address length: expected 32 bytes, got {0}")]
    InvalidLength(usize),

    /// Empty signature string.
    #[error("Empty transaction signature")]
    EmptySignature,
}
