//! # Domain Layer

pub mod config;
pub mod view;

pub use config::*;
pub use view::*;
