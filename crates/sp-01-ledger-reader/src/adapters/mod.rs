//! # Adapters Layer
//!
//! - `rpc`: JSON-RPC node over HTTP and WebSocket
//! - `memory`: in-process ledger with fault injection

pub mod memory;
pub mod rpc;

pub use memory::InMemoryLedger;
pub use rpc::JsonRpcLedger;
