//! # Chunk Views

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::{TokenAmount, ANONYMOUS_VIEWER};

/// External content identifier as sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Viewer identity; views without a wallet share the anonymous key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewerKey(String);

impl ViewerKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Key for an optional wallet; blank or missing maps to anonymous.
    pub fn from_optional(viewer: Option<&str>) -> Self {
        match viewer.map(str::trim) {
            Some(v) if !v.is_empty() => Self::new(v),
            _ => Self::anonymous(),
        }
    }

    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS_VIEWER)
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == ANONYMOUS_VIEWER
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViewerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One served chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkView {
    pub content: ContentId,
    pub chunk_id: String,
    pub viewer: ViewerKey,
    /// Opaque token the client presented for the chunk.
    pub payment_proof: String,
    pub observed_at: DateTime<Utc>,
    pub settled: bool,
}

/// Counters for one (content, viewer) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementStats {
    pub unsettled: usize,
    pub settled: usize,
    pub total: usize,
    /// `unsettled × price per chunk`, in base units.
    pub estimated_value: TokenAmount,
}
