//! # Program Account Layouts
//!
//! Mirrors of the streaming program's account structs. Each account is stored
//! on the ledger as an 8-byte discriminator followed by its borsh body; the
//! discriminator is the first 8 bytes of `sha256("account:<Name>")`.
//!
//! Only the fields are mirrored here. Validation and fee rules remain the
//! program's business.

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};
use shared_types::{Address, TokenAmount, UnixTimestamp};

use super::errors::AccountDecodeError;

/// Length of the account discriminator prefix.
pub const DISCRIMINATOR_LEN: usize = 8;

/// A typed account owned by the streaming program.
pub trait ProgramAccount: BorshSerialize + BorshDeserialize + Sized {
    /// Account struct name as declared by the program.
    const NAME: &'static str;

    /// Discriminator prefix for this account type.
    fn discriminator() -> [u8; DISCRIMINATOR_LEN] {
        let digest = Sha256::digest(format!("account:{}", Self::NAME).as_bytes());
        let mut out = [0u8; DISCRIMINATOR_LEN];
        out.copy_from_slice(&digest[..DISCRIMINATOR_LEN]);
        out
    }

    /// Decode raw account bytes.
    ///
    /// Trailing bytes after the body are ignored: accounts are allocated at
    /// their maximum size and string fields are usually shorter.
    fn decode(data: &[u8]) -> Result<Self, AccountDecodeError> {
        if data.len() < DISCRIMINATOR_LEN {
            return Err(AccountDecodeError::TooShort(data.len()));
        }
        let (prefix, mut body) = data.split_at(DISCRIMINATOR_LEN);
        if prefix != Self::discriminator() {
            return Err(AccountDecodeError::DiscriminatorMismatch {
                expected: Self::NAME,
            });
        }
        Self::deserialize(&mut body).map_err(|e| AccountDecodeError::InvalidBody {
            name: Self::NAME,
            reason: e.to_string(),
        })
    }

    /// Encode into the on-ledger byte layout.
    fn encode(&self) -> Vec<u8> {
        let mut out = Self::discriminator().to_vec();
        // Writing into a Vec cannot fail.
        let _ = borsh::to_writer(&mut out, self);
        out
    }
}

/// Global platform configuration.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PlatformAccount {
    pub authority: Address,
    pub token_mint: Address,
    pub platform_fee_basis_points: u16,
    pub min_price_per_chunk: TokenAmount,
    pub total_videos: u64,
    pub total_sessions: u64,
    pub total_revenue: TokenAmount,
    pub bump: u8,
}

impl ProgramAccount for PlatformAccount {
    const NAME: &'static str = "Platform";
}

/// A registered video.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct VideoAccount {
    pub creator: Address,
    /// Identifier shared with the local content catalogue.
    pub video_id: String,
    pub ipfs_hash: String,
    pub total_chunks: u32,
    pub price_per_chunk: TokenAmount,
    pub title: String,
    pub description: String,
    pub is_active: bool,
    pub total_sessions: u64,
    pub total_chunks_served: u64,
    pub created_at: UnixTimestamp,
    pub bump: u8,
}

impl ProgramAccount for VideoAccount {
    const NAME: &'static str = "Video";
}

/// A viewer's delegation state for one video.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ViewerSessionAccount {
    pub viewer: Address,
    pub video: Address,
    pub max_approved_chunks: u32,
    pub chunks_consumed: u32,
    pub total_spent: TokenAmount,
    /// Price locked at approval time.
    pub approved_price_per_chunk: TokenAmount,
    /// `None` until the first chunk is paid.
    pub last_paid_chunk_index: Option<u32>,
    pub session_start: UnixTimestamp,
    pub last_activity: UnixTimestamp,
    pub bump: u8,
}

impl ViewerSessionAccount {
    /// Chunks still covered by the approval.
    #[must_use]
    pub fn chunks_remaining(&self) -> u32 {
        self.max_approved_chunks.saturating_sub(self.chunks_consumed)
    }
}

impl ProgramAccount for ViewerSessionAccount {
    const NAME: &'static str = "ViewerSession";
}
