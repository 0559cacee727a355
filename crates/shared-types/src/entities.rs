//! # Core Domain Entities
//!
//! Ledger primitives consumed by the ingestion pipeline and the content
//! reference shared with the HTTP surface.
//!
//! ## Clusters
//!
//! - **Ledger**: `Address`, `TxSignature`, `LedgerTransaction`, `RawInstruction`
//! - **Discovery**: `SignatureInfo` (poll), `SignatureNotice` (subscription)
//! - **Content**: `ContentRecord`, the local view of an uploaded video

use std::fmt;
use std::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::errors::ParseError;

// =============================================================================
// CLUSTER A: LEDGER PRIMITIVES
// =============================================================================

/// Ledger slot number.
pub type Slot = u64;

/// Seconds since the Unix epoch, as reported by the ledger clock.
pub type UnixTimestamp = i64;

/// Token amount in base units (6 decimals for USDC).
pub type TokenAmount = u64;

/// Viewer key used when a chunk fetch carries no wallet identity.
pub const ANONYMOUS_VIEWER: &str = "anonymous";

/// A 32-byte ledger address (account key or program id).
///
/// Text form is base58, matching what RPC endpoints return.
#[derive(
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    BorshSerialize,
    BorshDeserialize,
    SerializeDisplay,
    DeserializeFromStr,
)]
pub struct Address(pub [u8; 32]);

impl Address {
    /// Wrap raw key bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| ParseError::InvalidBase58(e.to_string()))?;
        let len = bytes.len();
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ParseError::InvalidLength(len))?;
        Ok(Self(key))
    }
}

/// A transaction signature in its base58 text form.
///
/// Kept as text: the mirror only compares and stores signatures, and locally
/// triggered settlements use a synthetic `local:` identifier in the same column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxSignature(String);

impl TxSignature {
    /// Create a signature from its text form.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Text form of the signature.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TxSignature {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ParseError::EmptySignature);
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// A single top-level instruction as it appears in a fetched transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInstruction {
    /// Program that executes this instruction.
    pub program_id: Address,
    /// Instruction data; the first byte is the opcode.
    pub data: Vec<u8>,
    /// Ordered account keys passed to the program.
    pub accounts: Vec<Address>,
}

impl RawInstruction {
    /// First data byte, if any.
    #[must_use]
    pub fn opcode(&self) -> Option<u8> {
        self.data.first().copied()
    }
}

/// A fully fetched transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Transaction signature.
    pub signature: TxSignature,
    /// Slot the transaction landed in.
    pub slot: Slot,
    /// Block time, when the endpoint reports one.
    pub block_time: Option<UnixTimestamp>,
    /// True if the transaction executed with an error.
    pub failed: bool,
    /// Top-level instructions in order.
    pub instructions: Vec<RawInstruction>,
}

// =============================================================================
// CLUSTER B: DISCOVERY
// =============================================================================

/// One entry of a recent-signatures listing (poll path).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureInfo {
    /// Transaction signature.
    pub signature: TxSignature,
    /// Slot the transaction landed in.
    pub slot: Slot,
    /// True if the transaction executed with an error.
    pub failed: bool,
}

/// One notification from the live feed (subscription path).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureNotice {
    /// Transaction signature.
    pub signature: TxSignature,
    /// Slot the notification was produced for.
    pub slot: Slot,
}

// =============================================================================
// CLUSTER C: CONTENT
// =============================================================================

/// Local record of an uploaded video, owned by the platform's CRUD layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Local primary key.
    pub local_id: i64,
    /// Identifier shared with the ledger (`video_id` seed).
    pub external_id: String,
    /// Creator identity as known locally.
    pub creator: String,
    /// Current price per chunk in base units.
    pub price_per_chunk: TokenAmount,
    /// Ledger address of the video account once observed.
    pub ledger_address: Option<Address>,
    /// Whether the video can be streamed.
    pub is_active: bool,
}
