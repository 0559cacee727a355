//! # Settlement Reconciler

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use shared_bus::{ErrorKind, EventPublisher, SyncEvent};
use shared_types::{Address, ContentRecord, Slot, TxSignature, UnixTimestamp};
use sp_01_ledger_reader::{fetch_account, LedgerReader, ViewerSessionAccount};
use sp_03_mirror_store::{
    ChunkPaymentRecord, ContentDirectory, InsertOutcome, MirrorStore, SessionProgress,
    SessionRecord, SettlementRecord, StoreError,
};
use sp_05_chunk_tracker::{ChunkViewTracker, ContentId, ViewerKey};
use tracing::{debug, error, info, warn};

use crate::domain::{
    ChunkPaymentOutcome, FeePolicy, ObservedChunkPayment, ObservedSettlement, ReconcileOutcome,
    SettleOutcome, SettlementConfig, SettlementError,
};

/// Re-reads allowed when a settlement loses a race with another writer.
const MAX_SETTLE_ATTEMPTS: u32 = 3;

/// Reconciles ledger-reported consumption with the mirror.
pub struct SettlementReconciler {
    store: Arc<dyn MirrorStore>,
    content: Arc<dyn ContentDirectory>,
    ledger: Arc<dyn LedgerReader>,
    bus: Arc<dyn EventPublisher>,
    tracker: Arc<ChunkViewTracker>,
    fees: FeePolicy,
    client_timeout: Duration,
}

impl SettlementReconciler {
    pub fn new(
        config: &SettlementConfig,
        store: Arc<dyn MirrorStore>,
        content: Arc<dyn ContentDirectory>,
        ledger: Arc<dyn LedgerReader>,
        bus: Arc<dyn EventPublisher>,
        tracker: Arc<ChunkViewTracker>,
    ) -> Self {
        Self {
            store,
            content,
            ledger,
            bus,
            tracker,
            fees: FeePolicy::new(config.platform_fee_bps),
            client_timeout: Duration::from_secs(config.client_settle_timeout_secs),
        }
    }

    pub fn fee_policy(&self) -> FeePolicy {
        self.fees
    }

    // =========================================================================
    // LEDGER-OBSERVED SETTLEMENT
    // =========================================================================

    /// Record a settlement seen on the ledger.
    pub async fn reconcile(
        &self,
        observed: &ObservedSettlement,
    ) -> Result<ReconcileOutcome, SettlementError> {
        let signature = observed.signature.clone();
        let Some(settled) = self
            .settle_session(
                &observed.session,
                |_| signature.clone(),
                observed.slot,
                observed.block_time,
            )
            .await?
        else {
            warn!(
                session = %observed.session,
                signature = %observed.signature,
                "[sp-06] settlement for unmirrored session, skipping"
            );
            return Ok(ReconcileOutcome::SessionUnknown);
        };

        if let ReconcileOutcome::Recorded(_) = settled.outcome {
            self.tracker.mark_settled(
                &ContentId::new(settled.content.external_id.as_str()),
                &ViewerKey::new(settled.mirrored.viewer.to_string()),
            );
        }
        Ok(settled.outcome)
    }

    // =========================================================================
    // CLIENT-TRIGGERED SETTLEMENT
    // =========================================================================

    /// Settle a viewer's tracked views against the current ledger state.
    ///
    /// Ledger reads are bounded by the configured client timeout.
    pub async fn settle_for_viewer(
        &self,
        content: &ContentId,
        viewer: &ViewerKey,
        signature: Option<TxSignature>,
    ) -> Result<SettleOutcome, SettlementError> {
        tokio::time::timeout(
            self.client_timeout,
            self.settle_inner(content, viewer, signature),
        )
        .await
        .map_err(|_| SettlementError::Timeout(self.client_timeout))?
    }

    async fn settle_inner(
        &self,
        content_id: &ContentId,
        viewer: &ViewerKey,
        signature: Option<TxSignature>,
    ) -> Result<SettleOutcome, SettlementError> {
        // Anonymous views have no ledger session; they are cleared locally.
        if viewer.is_anonymous() {
            let settled = self.tracker.mark_settled(content_id, viewer);
            return Ok(SettleOutcome {
                settled,
                chunk_count: 0,
                signature: None,
                chunks_remaining: None,
            });
        }

        let viewer_address: Address = viewer
            .as_str()
            .parse()
            .map_err(|e| SettlementError::InvalidViewer(format!("{viewer}: {e}")))?;

        let content = self
            .content
            .find_content_by_external_id(content_id.as_str())?
            .ok_or_else(|| SettlementError::ContentNotFound(content_id.to_string()))?;

        let session = self
            .store
            .find_session_for_viewer(content.local_id, &viewer_address)?
            .ok_or_else(|| SettlementError::SessionNotFound {
                content: content_id.to_string(),
                viewer: viewer.to_string(),
            })?
            .session;

        let settled = self
            .settle_session(
                &session,
                |ledger| {
                    signature.clone().unwrap_or_else(|| {
                        TxSignature::new(format!("local:{}:{}", session, ledger.chunks_consumed))
                    })
                },
                None,
                None,
            )
            .await?
            .ok_or_else(|| SettlementError::SessionNotFound {
                content: content_id.to_string(),
                viewer: viewer.to_string(),
            })?;
        let settled_views = self.tracker.mark_settled(content_id, viewer);

        // Only a settlement row on this session's ledger state earns a signature.
        let (chunk_count, signature) = match settled.outcome {
            ReconcileOutcome::Recorded(record) => (record.chunk_count, Some(record.signature)),
            ReconcileOutcome::AlreadyRecorded => (0, Some(settled.signature)),
            ReconcileOutcome::AlreadyAbsorbed | ReconcileOutcome::SessionUnknown => (0, None),
        };
        Ok(SettleOutcome {
            settled: settled_views,
            chunk_count,
            signature,
            chunks_remaining: Some(settled.ledger.chunks_remaining()),
        })
    }

    // =========================================================================
    // PER-CHUNK PAYMENTS
    // =========================================================================

    /// Record a single paid chunk seen on the ledger.
    pub async fn record_chunk_payment(
        &self,
        observed: &ObservedChunkPayment,
    ) -> Result<ChunkPaymentOutcome, SettlementError> {
        let ledger_session = self.fetch_session(&observed.session).await?;

        let Some(mirrored) = self.store.find_session(&observed.session)? else {
            warn!(
                session = %observed.session,
                signature = %observed.signature,
                "[sp-06] chunk payment for unmirrored session, skipping"
            );
            return Ok(ChunkPaymentOutcome::SessionUnknown);
        };

        let Some(chunk_index) = observed
            .chunk_index
            .or(ledger_session.last_paid_chunk_index)
        else {
            return Err(self
                .violation(
                    format!("chunk payment {} carries no chunk index", observed.signature),
                    &observed.signature,
                )
                .await);
        };

        let content = self.content_for(&mirrored)?;
        let split = self.fees.split(ledger_session.approved_price_per_chunk);
        let payment = ChunkPaymentRecord {
            session: mirrored.session,
            content_id: mirrored.content_id,
            chunk_index,
            sequence: chunk_index.saturating_add(1),
            amount_paid: split.total,
            platform_fee: split.platform_fee,
            creator_amount: split.creator_amount,
            signature: observed.signature.clone(),
            viewer: mirrored.viewer,
            creator: content.creator.clone(),
            paid_at: observed
                .block_time
                .unwrap_or(ledger_session.last_activity),
        };

        let outcome = match self
            .store
            .record_chunk_payment(&payment, &progress_of(&ledger_session))
        {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.report_store_error(e, &observed.signature).await),
        };
        match outcome {
            InsertOutcome::AlreadyRecorded | InsertOutcome::Superseded => {
                debug!(
                    session = %payment.session,
                    chunk_index,
                    "[sp-06] chunk payment already recorded"
                );
                Ok(ChunkPaymentOutcome::AlreadyRecorded)
            }
            InsertOutcome::Inserted => {
                info!(
                    session = %payment.session,
                    chunk_index,
                    amount = payment.amount_paid,
                    "[sp-06] chunk payment recorded"
                );
                self.bus
                    .publish(SyncEvent::ChunkPaid {
                        session: payment.session,
                        content_id: payment.content_id,
                        viewer: payment.viewer,
                        chunk_index,
                        amount_paid: payment.amount_paid,
                        platform_fee: payment.platform_fee,
                        creator_amount: payment.creator_amount,
                        signature: payment.signature.clone(),
                    })
                    .await;
                Ok(ChunkPaymentOutcome::Recorded(payment))
            }
        }
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    async fn fetch_session(
        &self,
        session: &Address,
    ) -> Result<ViewerSessionAccount, SettlementError> {
        fetch_account::<ViewerSessionAccount>(self.ledger.as_ref(), session)
            .await?
            .ok_or(SettlementError::SessionAccountMissing(*session))
    }

    /// Settle `session` up to the ledger's current counter.
    ///
    /// A write computed against a mirror snapshot that another writer has
    /// since advanced is rolled back by the store; the session is then re-read
    /// and the delta recomputed. Returns `None` when the session is not mirrored.
    async fn settle_session<F>(
        &self,
        session: &Address,
        signature_for: F,
        slot: Option<Slot>,
        block_time: Option<UnixTimestamp>,
    ) -> Result<Option<SessionSettlement>, SettlementError>
    where
        F: Fn(&ViewerSessionAccount) -> TxSignature,
    {
        for attempt in 0..MAX_SETTLE_ATTEMPTS {
            let ledger = self.fetch_session(session).await?;
            let Some(mirrored) = self.store.find_session(session)? else {
                return Ok(None);
            };
            let content = self.content_for(&mirrored)?;
            let signature = signature_for(&ledger);

            // Another writer absorbed a state at least as fresh as ours.
            if attempt > 0 && ledger.chunks_consumed <= mirrored.chunks_consumed {
                debug!(
                    session = %session,
                    signature = %signature,
                    mirrored = mirrored.chunks_consumed,
                    ledger = ledger.chunks_consumed,
                    "[sp-06] session settled by a concurrent writer"
                );
                return Ok(Some(SessionSettlement {
                    outcome: ReconcileOutcome::AlreadyAbsorbed,
                    mirrored,
                    content,
                    ledger,
                    signature,
                }));
            }

            match self
                .apply(&mirrored, &ledger, &content, signature.clone(), slot, block_time)
                .await?
            {
                Some(outcome) => {
                    return Ok(Some(SessionSettlement {
                        outcome,
                        mirrored,
                        content,
                        ledger,
                        signature,
                    }))
                }
                None => debug!(
                    session = %session,
                    attempt,
                    "[sp-06] mirror moved during settlement, re-reading"
                ),
            }
        }

        warn!(
            session = %session,
            attempts = MAX_SETTLE_ATTEMPTS,
            "[sp-06] settlement kept losing to concurrent writers"
        );
        Err(SettlementError::Contention(*session))
    }

    fn content_for(&self, session: &SessionRecord) -> Result<ContentRecord, SettlementError> {
        self.content
            .find_content_by_id(session.content_id)?
            .ok_or_else(|| SettlementError::ContentNotFound(session.content_id.to_string()))
    }

    /// Compute the delta and write one settlement row.
    ///
    /// `None` means the mirror moved past `mirrored` before the write landed.
    async fn apply(
        &self,
        mirrored: &SessionRecord,
        ledger: &ViewerSessionAccount,
        content: &ContentRecord,
        signature: TxSignature,
        slot: Option<Slot>,
        block_time: Option<UnixTimestamp>,
    ) -> Result<Option<ReconcileOutcome>, SettlementError> {
        if ledger.chunks_consumed < mirrored.chunks_consumed {
            return Err(self
                .violation(
                    format!(
                        "session {} consumed went backwards: mirror {} ledger {}",
                        mirrored.session, mirrored.chunks_consumed, ledger.chunks_consumed
                    ),
                    &signature,
                )
                .await);
        }
        if ledger.chunks_consumed > ledger.max_approved_chunks {
            return Err(self
                .violation(
                    format!(
                        "session {} consumed {} exceeds approval {}",
                        mirrored.session, ledger.chunks_consumed, ledger.max_approved_chunks
                    ),
                    &signature,
                )
                .await);
        }

        let chunk_count = ledger.chunks_consumed - mirrored.chunks_consumed;
        if chunk_count == 0 {
            debug!(
                session = %mirrored.session,
                signature = %signature,
                "[sp-06] ledger state already absorbed"
            );
            return Ok(Some(ReconcileOutcome::AlreadyAbsorbed));
        }

        let split = self
            .fees
            .batch(chunk_count, ledger.approved_price_per_chunk)
            .ok_or(SettlementError::Overflow)?;

        let record = SettlementRecord {
            session: mirrored.session,
            content_id: mirrored.content_id,
            viewer: mirrored.viewer,
            creator: content.creator.clone(),
            chunk_count,
            total_payment: split.total,
            platform_fee: split.platform_fee,
            creator_amount: split.creator_amount,
            signature: signature.clone(),
            block_time,
            slot,
            chunks_consumed_after: ledger.chunks_consumed,
            chunks_remaining: ledger.chunks_remaining(),
            settled_at: block_time.unwrap_or_else(|| Utc::now().timestamp()),
        };

        let outcome = match self.store.record_settlement(&record, &progress_of(ledger)) {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.report_store_error(e, &signature).await),
        };
        match outcome {
            InsertOutcome::Inserted => {}
            InsertOutcome::AlreadyRecorded => {
                debug!(signature = %signature, "[sp-06] settlement already recorded");
                return Ok(Some(ReconcileOutcome::AlreadyRecorded));
            }
            InsertOutcome::Superseded => return Ok(None),
        }

        info!(
            session = %record.session,
            signature = %signature,
            chunk_count,
            total = record.total_payment,
            fee = record.platform_fee,
            "[sp-06] settlement recorded"
        );
        self.bus
            .publish(SyncEvent::SettlementRecorded {
                session: record.session,
                content_id: record.content_id,
                viewer: record.viewer,
                chunk_count,
                total_payment: record.total_payment,
                platform_fee: record.platform_fee,
                creator_amount: record.creator_amount,
                chunks_consumed: record.chunks_consumed_after,
                chunks_remaining: record.chunks_remaining,
                signature,
            })
            .await;
        Ok(Some(ReconcileOutcome::Recorded(record)))
    }

    async fn violation(&self, message: String, signature: &TxSignature) -> SettlementError {
        error!(signature = %signature, "[sp-06] INVARIANT VIOLATION: {}", message);
        self.bus
            .publish(SyncEvent::Error {
                kind: ErrorKind::InvariantViolation,
                message: message.clone(),
                signature: Some(signature.clone()),
            })
            .await;
        SettlementError::InvariantViolation(message)
    }

    async fn report_store_error(&self, err: StoreError, signature: &TxSignature) -> SettlementError {
        match err {
            StoreError::Invariant(message) => {
                self.violation(format!("store rejected write: {message}"), signature)
                    .await
            }
            other => SettlementError::Store(other),
        }
    }
}

struct SessionSettlement {
    outcome: ReconcileOutcome,
    mirrored: SessionRecord,
    content: ContentRecord,
    ledger: ViewerSessionAccount,
    signature: TxSignature,
}

fn progress_of(ledger: &ViewerSessionAccount) -> SessionProgress {
    SessionProgress {
        max_approved_chunks: ledger.max_approved_chunks,
        chunks_consumed: ledger.chunks_consumed,
        total_spent: ledger.total_spent,
        last_paid_chunk_index: ledger.last_paid_chunk_index,
        last_activity: ledger.last_activity,
    }
}
