//! # Domain Errors

use shared_types::Address;
use std::time::Duration;
use thiserror::Error;

/// Errors from ledger read operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Endpoint unreachable or returned a transport/server error.
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    /// The request did not complete in time.
    #[error("Ledger request timed out after {0:?}")]
    Timeout(Duration),

    /// The endpoint does not support live subscriptions.
    #[error("Subscription unsupported: {0}")]
    SubscriptionUnsupported(String),

    /// The endpoint answered with a shape we could not interpret.
    #[error("Malformed ledger response: {0}")]
    MalformedResponse(String),

    /// Account bytes did not match the expected layout.
    #[error("Account {address} could not be decoded: {source}")]
    AccountDecode {
        address: Address,
        source: AccountDecodeError,
    },
}

impl LedgerError {
    /// Whether retrying on the next cycle can succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// Errors decoding program account bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountDecodeError {
    /// Fewer bytes than the discriminator.
    #[error("account data too short ({0} bytes)")]
    TooShort(usize),

    /// Discriminator belongs to another account type.
    #[error("discriminator mismatch for {expected}")]
    DiscriminatorMismatch { expected: &'static str },

    /// Borsh body could not be read.
    #[error("invalid {name} body: {reason}")]
    InvalidBody { name: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(LedgerError::Unavailable("down".into()).is_transient());
        assert!(LedgerError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!LedgerError::MalformedResponse("x".into()).is_transient());
        assert!(!LedgerError::SubscriptionUnsupported("x".into()).is_transient());
    }
}
