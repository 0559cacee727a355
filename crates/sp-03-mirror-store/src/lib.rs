//! # Mirror Store Subsystem (sp-03)
//!
//! Off-chain relational mirror of the streaming program's state: viewer
//! sessions, per-chunk payment records, settlement batches, the local content
//! directory and the ingestion watermark.
//!
//! ## Idempotency
//!
//! Writes are made idempotent by the schema, not by in-process locks:
//!
//! - `chunk_payments` is unique on `(session, chunk_index)`
//! - `settlements` is unique on `signature` and on
//!   `(session, chunks_consumed_after)`, so two observers of the same ledger
//!   state cannot both record it
//! - session counters only move forward (`MAX()` on update) and
//!   `chunks_consumed <= max_approved_chunks` is a `CHECK` constraint
//!
//! A duplicate insert reports [`InsertOutcome::AlreadyRecorded`] instead of
//! failing.
//!
//! ## Hexagonal Architecture
//!
//! - **Domain Layer** (`domain/`): mirror records and errors
//! - **Ports Layer** (`ports/`): [`MirrorStore`] and [`ContentDirectory`]
//! - **Adapters Layer** (`adapters/`): SQLite via `rusqlite`

pub mod adapters;
pub mod domain;
pub mod ports;

pub use adapters::SqliteMirrorStore;
pub use domain::{
    ChunkPaymentRecord, InsertOutcome, SessionApproval, SessionProgress, SessionRecord,
    SettlementRecord, StoreError,
};
pub use ports::{ContentDirectory, MirrorStore};
