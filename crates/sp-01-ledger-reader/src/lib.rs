//! # Ledger Reader Subsystem (sp-01)
//!
//! Read-only access to the streaming program's state on the ledger: fetch a
//! transaction by signature, fetch and decode an account, list recent
//! signatures for the program, and subscribe to a live signature feed.
//!
//! ## Failure Model
//!
//! Every call may fail with [`LedgerError`]. Callers treat
//! [`LedgerError::is_transient`] failures as "retry next cycle"; nothing in
//! this crate panics or aborts on an unreachable endpoint. The live feed is
//! best-effort: endpoints without pub/sub return
//! [`LedgerError::SubscriptionUnsupported`] and the poll path carries on.
//!
//! ## Hexagonal Architecture
//!
//! - **Domain Layer** (`domain/`): account layouts, endpoint config, errors
//! - **Ports Layer** (`ports/`): the [`LedgerReader`] trait
//! - **Adapters Layer** (`adapters/`): JSON-RPC client and in-memory ledger

pub mod adapters;
pub mod domain;
pub mod ports;

pub use adapters::{InMemoryLedger, JsonRpcLedger};
pub use domain::{
    AccountDecodeError, LedgerError, PlatformAccount, ProgramAccount, RpcEndpointConfig,
    VideoAccount, ViewerSessionAccount,
};
pub use ports::{fetch_account, LedgerReader, SignatureFeed};
