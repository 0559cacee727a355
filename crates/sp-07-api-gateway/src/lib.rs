//! # API Gateway Subsystem (sp-07)
//!
//! HTTP surface for the client-triggered path.
//!
//! | Route | Method | Result |
//! |-------|--------|--------|
//! | `/track-chunk` | POST | record a served chunk, return the pair's stats |
//! | `/unsettled-count` | GET | unsettled views for `content` and `viewer`, as a bare integer |
//! | `/settlement-preview` | GET | estimated cost and fee split |
//! | `/settle` | POST | reconcile against the ledger, drain the tracker |
//! | `/health` | GET | liveness and ingestion watermark |
//!
//! A missing `viewer` means the anonymous viewer. `/settle` never answers
//! with an HTTP error for settlement failures: the body carries
//! `success: false` and the reason.

pub mod domain;
pub mod ports;
pub mod routes;
pub mod service;

pub use domain::{ApiError, HttpConfig, SettleResponse};
pub use ports::SyncStatus;
pub use routes::{build_router, AppState};
pub use service::serve;
