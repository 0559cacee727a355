//! # Settlement Reconciler Subsystem (sp-06)
//!
//! Turns ledger-reported consumption into settlement records.
//!
//! ## Rules
//!
//! - `chunk_count = ledger.chunks_consumed - mirror.chunks_consumed`
//! - `total_payment = chunk_count × approved_price_per_chunk`
//! - `platform_fee = floor(total_payment × bps / 10_000)`, remainder to the creator
//! - counters written to the mirror are the ledger's, never derived locally
//!
//! A negative delta, or ledger consumption above the approval, is an
//! invariant violation: logged, published on the `error` channel and dropped.
//! A zero delta means the ledger state was already absorbed.
//!
//! Both the ledger-observed path ([`SettlementReconciler::reconcile`]) and the
//! client trigger ([`SettlementReconciler::settle_for_viewer`]) drain the
//! chunk view tracker after a successful reconciliation.

pub mod domain;
pub mod reconciler;

pub use domain::{
    ChunkPaymentOutcome, FeePolicy, FeeSplit, ObservedChunkPayment, ObservedSettlement,
    ReconcileOutcome, SettleOutcome, SettlementConfig, SettlementError, BASIS_POINTS,
    DEFAULT_PLATFORM_FEE_BPS,
};
pub use reconciler::SettlementReconciler;
