//! # Sync Events
//!
//! Defines all event types that flow through the shared bus.

use serde::{Deserialize, Serialize};
use shared_types::{Address, Slot, TokenAmount, TxSignature};

/// All events that can be published to the event bus.
///
/// Each variant has a stable channel name (see [`SyncEvent::name`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SyncEvent {
    // =========================================================================
    // LIFECYCLE
    // =========================================================================
    /// The ingestion loop started.
    Started {
        /// Program being followed.
        program_id: Address,
        /// Watermark the loop resumed from.
        watermark: Slot,
    },

    /// The ingestion loop stopped.
    Stopped {
        /// Watermark at shutdown.
        watermark: Slot,
    },

    // =========================================================================
    // CONTENT
    // =========================================================================
    /// A video account was created on the ledger for known local content.
    VideoCreated {
        video: Address,
        external_id: String,
        creator: Address,
        price_per_chunk: TokenAmount,
        signature: TxSignature,
    },

    /// A video's price or availability changed on the ledger.
    VideoUpdated {
        video: Address,
        external_id: String,
        price_per_chunk: TokenAmount,
        is_active: bool,
        signature: TxSignature,
    },

    // =========================================================================
    // SESSIONS
    // =========================================================================
    /// A viewer delegation was approved and the session mirrored.
    SessionCreated {
        session: Address,
        content_id: i64,
        viewer: Address,
        max_approved_chunks: u32,
        approved_price_per_chunk: TokenAmount,
        /// True when an existing session extended its approval.
        is_reapproval: bool,
        signature: TxSignature,
    },

    /// A viewer revoked the delegation.
    DelegationRevoked {
        session: Address,
        viewer: Address,
        signature: TxSignature,
    },

    /// A viewer closed the session.
    SessionClosed {
        session: Address,
        viewer: Address,
        signature: TxSignature,
    },

    // =========================================================================
    // PAYMENTS
    // =========================================================================
    /// A batch settlement was recorded.
    SettlementRecorded {
        session: Address,
        content_id: i64,
        viewer: Address,
        chunk_count: u32,
        total_payment: TokenAmount,
        platform_fee: TokenAmount,
        creator_amount: TokenAmount,
        chunks_consumed: u32,
        chunks_remaining: u32,
        signature: TxSignature,
    },

    /// A single chunk payment was recorded (legacy path).
    ChunkPaid {
        session: Address,
        content_id: i64,
        viewer: Address,
        chunk_index: u32,
        amount_paid: TokenAmount,
        platform_fee: TokenAmount,
        creator_amount: TokenAmount,
        signature: TxSignature,
    },

    // =========================================================================
    // TRACKER
    // =========================================================================
    /// Unsettled views for a (content, viewer) pair crossed an advisory trigger.
    SettlementSuggested {
        content: String,
        viewer: String,
        unsettled: usize,
        estimated_value: TokenAmount,
        reason: SuggestionReason,
    },

    // =========================================================================
    // ERRORS
    // =========================================================================
    /// A recoverable failure that needs operator attention.
    Error {
        kind: ErrorKind,
        message: String,
        signature: Option<TxSignature>,
    },
}

/// Why the tracker suggested a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SuggestionReason {
    /// Unsettled count reached the configured threshold.
    Threshold,
    /// Oldest unsettled view is older than the configured interval.
    Interval,
}

/// Classification of errors published on the `error` channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Ledger read failed; retried next cycle.
    LedgerUnavailable,
    /// Instruction or account bytes could not be decoded.
    Decode,
    /// A required local parent record is missing.
    MirrorNotFound,
    /// Ledger state contradicts the mirror; the event was dropped.
    InvariantViolation,
    /// Mirror store write failed.
    Storage,
    /// A signature exhausted its retry budget.
    RetryExhausted,
}

impl SyncEvent {
    /// Stable channel name for this event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Stopped { .. } => "stopped",
            Self::VideoCreated { .. } => "videoCreated",
            Self::VideoUpdated { .. } => "videoUpdated",
            Self::SessionCreated { .. } => "sessionCreated",
            Self::DelegationRevoked { .. } => "delegationRevoked",
            Self::SessionClosed { .. } => "sessionClosed",
            Self::SettlementRecorded { .. } => "settlementRecorded",
            Self::ChunkPaid { .. } => "chunkPaid",
            Self::SettlementSuggested { .. } => "settlementSuggested",
            Self::Error { .. } => "error",
        }
    }

    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::Started { .. } | Self::Stopped { .. } => EventTopic::Lifecycle,
            Self::VideoCreated { .. } | Self::VideoUpdated { .. } => EventTopic::Content,
            Self::SessionCreated { .. }
            | Self::DelegationRevoked { .. }
            | Self::SessionClosed { .. } => EventTopic::Sessions,
            Self::SettlementRecorded { .. } | Self::ChunkPaid { .. } => EventTopic::Payments,
            Self::SettlementSuggested { .. } => EventTopic::Tracker,
            Self::Error { .. } => EventTopic::Errors,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Loop start/stop.
    Lifecycle,
    /// Video accounts.
    Content,
    /// Viewer sessions.
    Sessions,
    /// Settlements and chunk payments.
    Payments,
    /// Advisory settlement triggers.
    Tracker,
    /// The `error` channel.
    Errors,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Channel names to include. Empty means all names.
    pub names: Vec<&'static str>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            names: Vec::new(),
        }
    }

    /// Create a filter for specific channel names.
    #[must_use]
    pub fn names(names: Vec<&'static str>) -> Self {
        Self {
            topics: Vec::new(),
            names,
        }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &SyncEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let name_match = self.names.is_empty() || self.names.contains(&event.name());

        topic_match && name_match
    }
}
