//! # Domain Layer

pub mod errors;
pub mod operation;
pub mod table;

pub use errors::*;
pub use operation::*;
pub use table::*;
