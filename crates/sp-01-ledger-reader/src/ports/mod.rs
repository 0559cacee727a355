//! # Driven Ports (Outbound SPI)
//!
//! The ledger access the sync service depends on. Production wires the
//! JSON-RPC adapter; tests wire the in-memory ledger.

use async_trait::async_trait;
use futures::stream::BoxStream;
use shared_types::{Address, LedgerTransaction, SignatureInfo, SignatureNotice, TxSignature};

use crate::domain::{LedgerError, ProgramAccount};

/// Live stream of signatures touching the watched program.
///
/// The stream ends when the underlying connection drops; callers re-subscribe.
pub type SignatureFeed = BoxStream<'static, SignatureNotice>;

/// Read-only ledger access.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the poll loop, the live feed task
/// and settlement verification call into the same reader concurrently.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// Fetch a confirmed transaction. `Ok(None)` when the ledger does not
    /// (yet) know the signature.
    async fn get_transaction(
        &self,
        signature: &TxSignature,
    ) -> Result<Option<LedgerTransaction>, LedgerError>;

    /// Fetch raw account bytes. `Ok(None)` when the account does not exist.
    async fn get_account_data(&self, address: &Address) -> Result<Option<Vec<u8>>, LedgerError>;

    /// Most recent signatures that mention `program`, newest first.
    async fn list_recent_signatures(
        &self,
        program: &Address,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, LedgerError>;

    /// Open a live feed of signatures mentioning `program`.
    async fn subscribe(&self, program: &Address) -> Result<SignatureFeed, LedgerError>;
}

/// Fetch and decode a typed program account.
pub async fn fetch_account<T: ProgramAccount>(
    reader: &dyn LedgerReader,
    address: &Address,
) -> Result<Option<T>, LedgerError> {
    let Some(data) = reader.get_account_data(address).await? else {
        return Ok(None);
    };
    T::decode(&data)
        .map(Some)
        .map_err(|source| LedgerError::AccountDecode {
            address: *address,
            source,
        })
}
