//! # SolPlay Ledger Sync Runtime
//!
//! Loads configuration and wires the subsystems:
//!
//! - `sp-01` ledger reader (JSON-RPC)
//! - `sp-03` SQLite mirror store
//! - `sp-04` ingestion (poll + live feed)
//! - `sp-05` chunk view tracker
//! - `sp-06` settlement reconciler
//! - `sp-07` HTTP gateway
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (file, then environment overrides)
//! 2. Open the mirror store and load the watermark
//! 3. Start the event log and tracker sweep tasks
//! 4. Bind the HTTP gateway
//! 5. Start ingestion

pub mod config;
pub mod runtime;
pub mod tasks;

pub use config::{ConfigError, LedgerConfig, StorageConfig, SyncConfig};
pub use runtime::NodeRuntime;
