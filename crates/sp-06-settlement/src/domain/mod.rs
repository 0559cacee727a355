//! # Domain Layer

pub mod config;
pub mod errors;
pub mod fees;
pub mod outcome;

pub use config::*;
pub use errors::*;
pub use fees::*;
pub use outcome::*;
