//! # Driven Ports
//!
//! Persistence the sync pipeline depends on. Both traits are synchronous;
//! the SQLite adapter completes each call in a single short transaction.

use shared_types::{Address, ContentRecord, Slot, TokenAmount};

use crate::domain::{
    ChunkPaymentRecord, InsertOutcome, SessionApproval, SessionProgress, SessionRecord,
    SettlementRecord, StoreError,
};

/// Read/write access to the mirrored program state.
pub trait MirrorStore: Send + Sync {
    // === Sessions ===

    /// Insert a newly observed session. A second insert of the same address
    /// reports `AlreadyRecorded`.
    fn insert_session(&self, session: &SessionRecord) -> Result<InsertOutcome, StoreError>;

    /// Refresh approval fields on re-approval. Returns false if the session
    /// is unknown.
    fn apply_reapproval(
        &self,
        session: &Address,
        approval: &SessionApproval,
    ) -> Result<bool, StoreError>;

    fn find_session(&self, session: &Address) -> Result<Option<SessionRecord>, StoreError>;

    /// Most recently active session of `viewer` on `content_id`.
    fn find_session_for_viewer(
        &self,
        content_id: i64,
        viewer: &Address,
    ) -> Result<Option<SessionRecord>, StoreError>;

    /// Flip the active flag off. Returns false if the session is unknown.
    fn deactivate_session(
        &self,
        session: &Address,
        last_activity: i64,
    ) -> Result<bool, StoreError>;

    // === Payments ===

    /// Insert a settlement and advance the session in one transaction.
    /// The session is untouched when the signature, or the session's
    /// consumption level, was already recorded.
    ///
    /// The settlement is computed against the mirrored counter
    /// `chunks_consumed_after - chunk_count`. If the session no longer sits
    /// at that counter, nothing is written and `Superseded` is returned.
    fn record_settlement(
        &self,
        settlement: &SettlementRecord,
        progress: &SessionProgress,
    ) -> Result<InsertOutcome, StoreError>;

    /// Insert a chunk payment and advance the session in one transaction.
    /// The session is untouched when `(session, chunk_index)` already exists.
    fn record_chunk_payment(
        &self,
        payment: &ChunkPaymentRecord,
        progress: &SessionProgress,
    ) -> Result<InsertOutcome, StoreError>;

    fn settlements_for_session(
        &self,
        session: &Address,
    ) -> Result<Vec<SettlementRecord>, StoreError>;

    fn chunk_payments_for_session(
        &self,
        session: &Address,
    ) -> Result<Vec<ChunkPaymentRecord>, StoreError>;

    // === Watermark ===

    fn load_watermark(&self) -> Result<Option<Slot>, StoreError>;

    fn save_watermark(&self, slot: Slot) -> Result<(), StoreError>;
}

/// The local content catalogue, owned by the platform's CRUD layer.
pub trait ContentDirectory: Send + Sync {
    fn find_content_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<ContentRecord>, StoreError>;

    fn find_content_by_id(&self, local_id: i64) -> Result<Option<ContentRecord>, StoreError>;

    /// Create or update a catalogue entry by external id.
    fn upsert_content(
        &self,
        external_id: &str,
        creator: &str,
        price_per_chunk: TokenAmount,
    ) -> Result<ContentRecord, StoreError>;

    /// Attach the ledger address and ledger price. Returns false if the
    /// content is unknown.
    fn link_content(
        &self,
        external_id: &str,
        ledger_address: &Address,
        price_per_chunk: TokenAmount,
    ) -> Result<bool, StoreError>;

    /// Sync price and availability. Returns false if the content is unknown.
    fn update_content_listing(
        &self,
        external_id: &str,
        price_per_chunk: TokenAmount,
        is_active: bool,
    ) -> Result<bool, StoreError>;
}
