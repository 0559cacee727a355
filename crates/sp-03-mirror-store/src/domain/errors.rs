//! # Store Errors

use thiserror::Error;

/// Errors from the mirror store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A write would break a mirrored invariant (`CHECK` constraint).
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// A row references a parent that does not exist.
    #[error("Missing parent record: {0}")]
    MissingParent(String),

    /// A stored value could not be read back.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}
