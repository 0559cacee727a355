//! # Instruction Decoder Subsystem (sp-02)
//!
//! Pure mapping from a raw instruction to a typed [`Operation`] and the
//! accounts it touched, keyed by the first data byte.
//!
//! ## Contract
//!
//! - Instructions for another program decode to [`Operation::Unknown`].
//! - Unknown opcodes decode to [`Operation::Unknown`]; they are skipped by the
//!   caller, never treated as errors, so program upgrades do not stall sync.
//! - A known opcode with fewer accounts than its layout needs is a
//!   [`DecodeError`].
//!
//! The opcode table is versioned together with the on-ledger program and must
//! change in lockstep with its instruction ordering.

pub mod decoder;
pub mod domain;

pub use decoder::decode;
pub use domain::{
    AccountLayout, DecodeError, DecodedInstruction, InstructionAccounts, OpcodeSpec, Operation,
    OperationKind, OPCODE_TABLE,
};
