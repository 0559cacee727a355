//! # Ledger Ingestion Subsystem (sp-04)
//!
//! Follows the streaming program's transactions and keeps the mirror in step.
//!
//! ## Discovery
//!
//! - **Poll** (required): every `poll_interval_secs`, list recent signatures
//!   for the program and process them oldest first.
//! - **Live feed** (optional): a push subscription feeding the same pipeline.
//!   Failure to open it is logged; a dropped feed is re-opened on a back-off.
//!
//! ## Watermark
//!
//! The highest fully handled slot. A signature at or below it is skipped
//! unless it is queued for retry. Failed fetches are retried for a bounded
//! number of cycles; the watermark only moves after a transaction's
//! instructions were all handled. The persisted value never passes a queued
//! retry, so a restart does not lose it.
//!
//! ## Errors
//!
//! Ledger, decode and store errors are logged and published on the `error`
//! channel. None of them terminates the loop.

pub mod domain;
pub mod handlers;
pub mod service;

pub use domain::{IngestionConfig, RetryDecision, SyncError, Watermark};
pub use handlers::{HandleOutcome, InstructionHandlers, TxContext};
pub use service::{IngestionService, PollReport, ProcessOutcome};
