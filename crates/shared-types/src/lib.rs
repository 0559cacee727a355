//! # Shared Types Crate
//!
//! This crate contains the ledger primitives and the mirror entities shared by
//! every subsystem of the sync pipeline.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-subsystem types are defined here.
//! - **Ledger is authoritative**: counters carried by these types are always
//!   copied from fetched ledger state, never derived locally.
//! - **No I/O**: this crate only defines data; adapters live in subsystems.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
