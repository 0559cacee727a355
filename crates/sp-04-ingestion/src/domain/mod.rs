//! # Domain Layer

pub mod config;
pub mod errors;
pub mod watermark;

pub use config::*;
pub use errors::*;
pub use watermark::*;
