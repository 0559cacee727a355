//! Instruction decoding.

use shared_types::{Address, RawInstruction, UnixTimestamp};

use crate::domain::table::lookup;
use crate::domain::{
    DecodeError, DecodedInstruction, InstructionAccounts, Operation, OperationKind,
};

/// Decode one instruction against the watched program.
///
/// Pure: the same input always yields the same output.
pub fn decode(
    instruction: &RawInstruction,
    program_id: &Address,
    block_time: Option<UnixTimestamp>,
) -> Result<DecodedInstruction, DecodeError> {
    let opcode = instruction.opcode();
    if instruction.program_id != *program_id {
        return Ok(DecodedInstruction::unknown(opcode, block_time));
    }
    let Some(entry) = opcode.and_then(lookup) else {
        return Ok(DecodedInstruction::unknown(opcode, block_time));
    };

    let len = instruction.accounts.len();
    if let Some(max) = entry.layout.max_index() {
        if max >= len {
            return Err(DecodeError::MissingAccount {
                operation: entry.kind,
                index: max,
                len,
            });
        }
    }

    let pick = |index: Option<usize>| index.and_then(|i| instruction.accounts.get(i).copied());
    let accounts = InstructionAccounts {
        session: pick(entry.layout.session),
        video: pick(entry.layout.video),
        platform: pick(entry.layout.platform),
        viewer: pick(entry.layout.viewer),
        creator: pick(entry.layout.creator),
    };

    let argument = read_u32_arg(&instruction.data);
    let operation = match entry.kind {
        OperationKind::Initialize => Operation::Initialize,
        OperationKind::CreateVideo => Operation::CreateVideo,
        OperationKind::UpdateVideo => Operation::UpdateVideo,
        OperationKind::ApproveDelegate => Operation::ApproveDelegate {
            max_chunks: argument,
        },
        OperationKind::SettleSession => Operation::SettleSession {
            chunk_count: argument,
        },
        OperationKind::PayForChunk => Operation::PayForChunk {
            chunk_index: argument,
        },
        OperationKind::RevokeDelegate => Operation::RevokeDelegate,
        OperationKind::CloseSession => Operation::CloseSession,
    };

    Ok(DecodedInstruction {
        operation,
        accounts,
        block_time,
    })
}

/// Little-endian u32 directly after the opcode.
fn read_u32_arg(data: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = data.get(1..5)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}
