//! # Chunk View Tracker Subsystem (sp-05)
//!
//! Per `(content, viewer)` accumulator of chunk views that have been served
//! but not yet settled on the ledger.
//!
//! ## Scope
//!
//! - Single process, in memory, not durable. A restart forgets unsettled
//!   views; the ledger remains the source of truth for what was paid.
//! - Thresholds are advisory: crossing one publishes
//!   `SyncEvent::SettlementSuggested` and never writes to the ledger.
//! - Each key is mutated under its own map entry lock, so concurrent views
//!   for different viewers never contend.

pub mod domain;
pub mod tracker;

pub use domain::{ChunkView, ContentId, SettlementStats, TrackerConfig, ViewerKey};
pub use tracker::ChunkViewTracker;
