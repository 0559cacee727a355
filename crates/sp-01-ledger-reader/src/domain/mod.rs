//! # Domain Layer
//!
//! Account layouts of the streaming program and the reader's error model.
//! No I/O lives here.

pub mod accounts;
pub mod config;
pub mod errors;

pub use accounts::*;
pub use config::*;
pub use errors::*;
