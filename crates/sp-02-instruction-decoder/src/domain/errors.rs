use thiserror::Error;

use super::OperationKind;

/// Errors decoding a known instruction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The instruction carried fewer accounts than its layout requires.
    #[error("{operation} expects an account at position {index} but only {len} were passed")]
    MissingAccount {
        operation: OperationKind,
        index: usize,
        len: usize,
    },
}
