//! # Adapters Layer

pub mod sqlite;

pub use sqlite::SqliteMirrorStore;
