//! # Instruction Handlers
//!
//! One handler per decoded operation. Every handler reads authoritative
//! values from fetched ledger accounts and writes them to the mirror; the
//! instruction itself only says which accounts to look at.
//!
//! Handlers are idempotent: replaying a transaction leaves the mirror
//! unchanged and publishes nothing new.

use std::sync::Arc;

use chrono::Utc;
use shared_bus::{EventPublisher, SyncEvent};
use shared_types::{Address, Slot, TxSignature, UnixTimestamp};
use sp_01_ledger_reader::{
    fetch_account, LedgerReader, PlatformAccount, VideoAccount, ViewerSessionAccount,
};
use sp_02_instruction_decoder::{
    DecodedInstruction, InstructionAccounts, Operation, OperationKind,
};
use sp_03_mirror_store::{
    ContentDirectory, InsertOutcome, MirrorStore, SessionApproval, SessionRecord,
};
use sp_06_settlement::{
    ChunkPaymentOutcome, ObservedChunkPayment, ObservedSettlement, ReconcileOutcome,
    SettlementReconciler,
};
use tracing::{debug, info, warn};

use crate::domain::SyncError;

/// What a handler did with an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// The mirror changed.
    Applied,
    /// Already reflected in the mirror.
    Unchanged,
    /// Nothing to do (unknown instruction, unmirrored session).
    Ignored,
}

/// The enclosing transaction.
#[derive(Debug, Clone, Copy)]
pub struct TxContext<'a> {
    pub signature: &'a TxSignature,
    pub slot: Slot,
}

pub struct InstructionHandlers {
    store: Arc<dyn MirrorStore>,
    content: Arc<dyn ContentDirectory>,
    ledger: Arc<dyn LedgerReader>,
    bus: Arc<dyn EventPublisher>,
    reconciler: Arc<SettlementReconciler>,
}

impl InstructionHandlers {
    pub fn new(
        store: Arc<dyn MirrorStore>,
        content: Arc<dyn ContentDirectory>,
        ledger: Arc<dyn LedgerReader>,
        bus: Arc<dyn EventPublisher>,
        reconciler: Arc<SettlementReconciler>,
    ) -> Self {
        Self {
            store,
            content,
            ledger,
            bus,
            reconciler,
        }
    }

    pub async fn handle(
        &self,
        instruction: &DecodedInstruction,
        tx: TxContext<'_>,
    ) -> Result<HandleOutcome, SyncError> {
        let Some(kind) = instruction.operation.kind() else {
            return Ok(HandleOutcome::Ignored);
        };
        debug!(
            signature = %tx.signature,
            slot = tx.slot,
            operation = %kind,
            "[sp-04] handling instruction"
        );

        match &instruction.operation {
            Operation::Initialize => self.on_initialize(instruction, tx).await,
            Operation::CreateVideo => self.on_create_video(instruction, tx).await,
            Operation::UpdateVideo => self.on_update_video(instruction, tx).await,
            Operation::ApproveDelegate { .. } => self.on_approve(instruction, tx).await,
            Operation::SettleSession { .. } => self.on_settle(instruction, tx).await,
            Operation::PayForChunk { chunk_index } => {
                self.on_chunk_payment(instruction, *chunk_index, tx).await
            }
            Operation::RevokeDelegate | Operation::CloseSession => {
                self.on_session_end(instruction, kind, tx).await
            }
            Operation::Unknown { .. } => Ok(HandleOutcome::Ignored),
        }
    }

    // =========================================================================
    // PLATFORM & CONTENT
    // =========================================================================

    async fn on_initialize(
        &self,
        instruction: &DecodedInstruction,
        tx: TxContext<'_>,
    ) -> Result<HandleOutcome, SyncError> {
        let address = role(instruction, OperationKind::Initialize, "platform", |a| a.platform)?;
        let Some(platform) = fetch_account::<PlatformAccount>(self.ledger.as_ref(), &address).await?
        else {
            warn!(platform = %address, "[sp-04] platform account not found");
            return Ok(HandleOutcome::Ignored);
        };

        info!(
            platform = %address,
            signature = %tx.signature,
            fee_bps = platform.platform_fee_basis_points,
            min_price = platform.min_price_per_chunk,
            "[sp-04] platform initialized"
        );
        let local_bps = self.reconciler.fee_policy().platform_fee_bps();
        if platform.platform_fee_basis_points != local_bps {
            warn!(
                ledger_bps = platform.platform_fee_basis_points,
                local_bps,
                "[sp-04] ledger platform fee differs from the configured rate"
            );
        }
        Ok(HandleOutcome::Unchanged)
    }

    async fn on_create_video(
        &self,
        instruction: &DecodedInstruction,
        tx: TxContext<'_>,
    ) -> Result<HandleOutcome, SyncError> {
        let address = role(instruction, OperationKind::CreateVideo, "video", |a| a.video)?;
        let video = self.fetch_video(&address).await?;

        if let Some(existing) = self.content.find_content_by_external_id(&video.video_id)? {
            if existing.ledger_address == Some(address)
                && existing.price_per_chunk == video.price_per_chunk
            {
                return Ok(HandleOutcome::Unchanged);
            }
        }
        if !self
            .content
            .link_content(&video.video_id, &address, video.price_per_chunk)?
        {
            return Err(SyncError::MirrorNotFound(format!(
                "content {} for video {}",
                video.video_id, address
            )));
        }

        info!(
            video = %address,
            external_id = %video.video_id,
            price = video.price_per_chunk,
            "[sp-04] video linked"
        );
        self.bus
            .publish(SyncEvent::VideoCreated {
                video: address,
                external_id: video.video_id,
                creator: video.creator,
                price_per_chunk: video.price_per_chunk,
                signature: tx.signature.clone(),
            })
            .await;
        Ok(HandleOutcome::Applied)
    }

    async fn on_update_video(
        &self,
        instruction: &DecodedInstruction,
        tx: TxContext<'_>,
    ) -> Result<HandleOutcome, SyncError> {
        let address = role(instruction, OperationKind::UpdateVideo, "video", |a| a.video)?;
        let video = self.fetch_video(&address).await?;

        let Some(existing) = self.content.find_content_by_external_id(&video.video_id)? else {
            return Err(SyncError::MirrorNotFound(format!(
                "content {} for video {}",
                video.video_id, address
            )));
        };
        if existing.price_per_chunk == video.price_per_chunk
            && existing.is_active == video.is_active
        {
            return Ok(HandleOutcome::Unchanged);
        }
        self.content
            .update_content_listing(&video.video_id, video.price_per_chunk, video.is_active)?;

        info!(
            video = %address,
            price = video.price_per_chunk,
            is_active = video.is_active,
            "[sp-04] video updated"
        );
        self.bus
            .publish(SyncEvent::VideoUpdated {
                video: address,
                external_id: video.video_id,
                price_per_chunk: video.price_per_chunk,
                is_active: video.is_active,
                signature: tx.signature.clone(),
            })
            .await;
        Ok(HandleOutcome::Applied)
    }

    // =========================================================================
    // SESSIONS
    // =========================================================================

    async fn on_approve(
        &self,
        instruction: &DecodedInstruction,
        tx: TxContext<'_>,
    ) -> Result<HandleOutcome, SyncError> {
        let kind = OperationKind::ApproveDelegate;
        let session_address = role(instruction, kind, "session", |a| a.session)?;
        let video_address = role(instruction, kind, "video", |a| a.video)?;

        let ledger_session = self.fetch_session(&session_address).await?;
        let video = self.fetch_video(&video_address).await?;

        let Some(content) = self.content.find_content_by_external_id(&video.video_id)? else {
            return Err(SyncError::MirrorNotFound(format!(
                "content {} for session {}",
                video.video_id, session_address
            )));
        };

        let record = SessionRecord {
            session: session_address,
            content_id: content.local_id,
            viewer: ledger_session.viewer,
            max_approved_chunks: ledger_session.max_approved_chunks,
            chunks_consumed: ledger_session.chunks_consumed,
            total_spent: ledger_session.total_spent,
            approved_price_per_chunk: ledger_session.approved_price_per_chunk,
            last_paid_chunk_index: ledger_session.last_paid_chunk_index,
            session_start: ledger_session.session_start,
            last_activity: ledger_session.last_activity,
            is_active: true,
        };

        let is_reapproval = match self.store.insert_session(&record)? {
            InsertOutcome::Inserted => false,
            InsertOutcome::AlreadyRecorded | InsertOutcome::Superseded => {
                let unchanged = self.store.find_session(&session_address)?.is_some_and(|m| {
                    m.is_active
                        && m.max_approved_chunks >= ledger_session.max_approved_chunks
                        && m.approved_price_per_chunk == ledger_session.approved_price_per_chunk
                });
                if unchanged {
                    return Ok(HandleOutcome::Unchanged);
                }
                self.store.apply_reapproval(
                    &session_address,
                    &SessionApproval {
                        max_approved_chunks: ledger_session.max_approved_chunks,
                        approved_price_per_chunk: ledger_session.approved_price_per_chunk,
                        last_activity: ledger_session.last_activity,
                    },
                )?;
                true
            }
        };

        info!(
            session = %session_address,
            viewer = %record.viewer,
            max_chunks = record.max_approved_chunks,
            is_reapproval,
            "[sp-04] delegation approved"
        );
        self.bus
            .publish(SyncEvent::SessionCreated {
                session: session_address,
                content_id: content.local_id,
                viewer: record.viewer,
                max_approved_chunks: record.max_approved_chunks,
                approved_price_per_chunk: record.approved_price_per_chunk,
                is_reapproval,
                signature: tx.signature.clone(),
            })
            .await;
        Ok(HandleOutcome::Applied)
    }

    async fn on_session_end(
        &self,
        instruction: &DecodedInstruction,
        kind: OperationKind,
        tx: TxContext<'_>,
    ) -> Result<HandleOutcome, SyncError> {
        let session = role(instruction, kind, "session", |a| a.session)?;
        let viewer = role(instruction, kind, "viewer", |a| a.viewer)?;

        let Some(mirrored) = self.store.find_session(&session)? else {
            warn!(session = %session, operation = %kind, "[sp-04] unmirrored session, skipping");
            return Ok(HandleOutcome::Ignored);
        };
        if !mirrored.is_active {
            return Ok(HandleOutcome::Unchanged);
        }

        let at = instruction.block_time.unwrap_or_else(now);
        self.store.deactivate_session(&session, at)?;
        info!(session = %session, operation = %kind, "[sp-04] session deactivated");

        let signature = tx.signature.clone();
        let event = if kind == OperationKind::CloseSession {
            SyncEvent::SessionClosed {
                session,
                viewer,
                signature,
            }
        } else {
            SyncEvent::DelegationRevoked {
                session,
                viewer,
                signature,
            }
        };
        self.bus.publish(event).await;
        Ok(HandleOutcome::Applied)
    }

    // =========================================================================
    // PAYMENTS
    // =========================================================================

    async fn on_settle(
        &self,
        instruction: &DecodedInstruction,
        tx: TxContext<'_>,
    ) -> Result<HandleOutcome, SyncError> {
        let session = role(instruction, OperationKind::SettleSession, "session", |a| a.session)?;
        let outcome = self
            .reconciler
            .reconcile(&ObservedSettlement {
                session,
                signature: tx.signature.clone(),
                slot: Some(tx.slot),
                block_time: instruction.block_time,
            })
            .await?;
        Ok(match outcome {
            ReconcileOutcome::Recorded(_) => HandleOutcome::Applied,
            ReconcileOutcome::AlreadyRecorded | ReconcileOutcome::AlreadyAbsorbed => {
                HandleOutcome::Unchanged
            }
            ReconcileOutcome::SessionUnknown => HandleOutcome::Ignored,
        })
    }

    async fn on_chunk_payment(
        &self,
        instruction: &DecodedInstruction,
        chunk_index: Option<u32>,
        tx: TxContext<'_>,
    ) -> Result<HandleOutcome, SyncError> {
        let session = role(instruction, OperationKind::PayForChunk, "session", |a| a.session)?;
        let outcome = self
            .reconciler
            .record_chunk_payment(&ObservedChunkPayment {
                session,
                chunk_index,
                signature: tx.signature.clone(),
                block_time: instruction.block_time,
            })
            .await?;
        Ok(match outcome {
            ChunkPaymentOutcome::Recorded(_) => HandleOutcome::Applied,
            ChunkPaymentOutcome::AlreadyRecorded => HandleOutcome::Unchanged,
            ChunkPaymentOutcome::SessionUnknown => HandleOutcome::Ignored,
        })
    }

    // =========================================================================
    // LEDGER READS
    // =========================================================================

    async fn fetch_video(&self, address: &Address) -> Result<VideoAccount, SyncError> {
        fetch_account::<VideoAccount>(self.ledger.as_ref(), address)
            .await?
            .ok_or_else(|| SyncError::MirrorNotFound(format!("video account {address}")))
    }

    async fn fetch_session(&self, address: &Address) -> Result<ViewerSessionAccount, SyncError> {
        fetch_account::<ViewerSessionAccount>(self.ledger.as_ref(), address)
            .await?
            .ok_or_else(|| SyncError::MirrorNotFound(format!("session account {address}")))
    }
}

fn role(
    instruction: &DecodedInstruction,
    operation: OperationKind,
    role: &'static str,
    pick: impl Fn(&InstructionAccounts) -> Option<Address>,
) -> Result<Address, SyncError> {
    pick(&instruction.accounts).ok_or(SyncError::MissingAccount { operation, role })
}

fn now() -> UnixTimestamp {
    Utc::now().timestamp()
}
