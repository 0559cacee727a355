//! # Decoded Operations

use std::fmt;

use serde::{Deserialize, Serialize};
use shared_types::{Address, UnixTimestamp};

/// Operation names in the program's opcode order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    Initialize,
    CreateVideo,
    UpdateVideo,
    ApproveDelegate,
    SettleSession,
    PayForChunk,
    RevokeDelegate,
    CloseSession,
}

impl OperationKind {
    /// Stable camelCase name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::CreateVideo => "createVideo",
            Self::UpdateVideo => "updateVideo",
            Self::ApproveDelegate => "approveDelegate",
            Self::SettleSession => "settleSession",
            Self::PayForChunk => "payForChunk",
            Self::RevokeDelegate => "revokeDelegate",
            Self::CloseSession => "closeSession",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed operation with the scalar arguments the mirror cares about.
///
/// Arguments are `None` when the data is shorter than expected; they are
/// informational and handlers read authoritative values from accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Operation {
    Initialize,
    CreateVideo,
    UpdateVideo,
    ApproveDelegate { max_chunks: Option<u32> },
    SettleSession { chunk_count: Option<u32> },
    PayForChunk { chunk_index: Option<u32> },
    RevokeDelegate,
    CloseSession,
    /// Another program, an unrecognized opcode, or empty data.
    Unknown { opcode: Option<u8> },
}

impl Operation {
    /// Kind of a recognized operation.
    pub fn kind(&self) -> Option<OperationKind> {
        Some(match self {
            Self::Initialize => OperationKind::Initialize,
            Self::CreateVideo => OperationKind::CreateVideo,
            Self::UpdateVideo => OperationKind::UpdateVideo,
            Self::ApproveDelegate { .. } => OperationKind::ApproveDelegate,
            Self::SettleSession { .. } => OperationKind::SettleSession,
            Self::PayForChunk { .. } => OperationKind::PayForChunk,
            Self::RevokeDelegate => OperationKind::RevokeDelegate,
            Self::CloseSession => OperationKind::CloseSession,
            Self::Unknown { .. } => return None,
        })
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown { .. })
    }

    /// Name for logs; `unknown` for unrecognized instructions.
    pub fn name(&self) -> &'static str {
        self.kind().map_or("unknown", |k| k.name())
    }
}

/// Accounts an operation touched, by role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionAccounts {
    pub session: Option<Address>,
    pub video: Option<Address>,
    pub platform: Option<Address>,
    pub viewer: Option<Address>,
    pub creator: Option<Address>,
}

/// Result of decoding one instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedInstruction {
    pub operation: Operation,
    pub accounts: InstructionAccounts,
    /// Block time of the enclosing transaction.
    pub block_time: Option<UnixTimestamp>,
}

impl DecodedInstruction {
    pub(crate) fn unknown(opcode: Option<u8>, block_time: Option<UnixTimestamp>) -> Self {
        Self {
            operation: Operation::Unknown { opcode },
            accounts: InstructionAccounts::default(),
            block_time,
        }
    }
}
