//! # Opcode Table
//!
//! Positional account layouts per operation, as the program declares them.

use super::OperationKind;

/// Positions of the role accounts inside an instruction's account list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountLayout {
    pub session: Option<usize>,
    pub video: Option<usize>,
    pub platform: Option<usize>,
    pub viewer: Option<usize>,
    pub creator: Option<usize>,
}

impl AccountLayout {
    const EMPTY: Self = Self {
        session: None,
        video: None,
        platform: None,
        viewer: None,
        creator: None,
    };

    /// Highest position the layout reads.
    pub fn max_index(&self) -> Option<usize> {
        [
            self.session,
            self.video,
            self.platform,
            self.viewer,
            self.creator,
        ]
        .into_iter()
        .flatten()
        .max()
    }
}

/// One row of the opcode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeSpec {
    pub opcode: u8,
    pub kind: OperationKind,
    pub layout: AccountLayout,
}

/// Opcode table, indexed by the first data byte.
pub const OPCODE_TABLE: [OpcodeSpec; 8] = [
    // [platform, token_mint, authority, system_program]
    OpcodeSpec {
        opcode: 0,
        kind: OperationKind::Initialize,
        layout: AccountLayout {
            platform: Some(0),
            ..AccountLayout::EMPTY
        },
    },
    // [video, creator_earnings, platform, creator, ...]
    OpcodeSpec {
        opcode: 1,
        kind: OperationKind::CreateVideo,
        layout: AccountLayout {
            video: Some(0),
            platform: Some(2),
            creator: Some(3),
            ..AccountLayout::EMPTY
        },
    },
    // [video, platform, creator]
    OpcodeSpec {
        opcode: 2,
        kind: OperationKind::UpdateVideo,
        layout: AccountLayout {
            video: Some(0),
            platform: Some(1),
            creator: Some(2),
            ..AccountLayout::EMPTY
        },
    },
    // [session, video, creator_earnings, platform, token_mint,
    //  viewer_token, platform_token, viewer, ...]
    OpcodeSpec {
        opcode: 3,
        kind: OperationKind::ApproveDelegate,
        layout: AccountLayout {
            session: Some(0),
            video: Some(1),
            platform: Some(3),
            viewer: Some(7),
            creator: None,
        },
    },
    // [session, video, creator_earnings, platform, viewer_token,
    //  creator_token, platform_token, viewer, ...]
    OpcodeSpec {
        opcode: 4,
        kind: OperationKind::SettleSession,
        layout: AccountLayout {
            session: Some(0),
            video: Some(1),
            platform: Some(3),
            viewer: Some(7),
            creator: None,
        },
    },
    // same order as settleSession
    OpcodeSpec {
        opcode: 5,
        kind: OperationKind::PayForChunk,
        layout: AccountLayout {
            session: Some(0),
            video: Some(1),
            platform: Some(3),
            viewer: Some(7),
            creator: None,
        },
    },
    // [session, video, platform, viewer_token, viewer, ...]
    OpcodeSpec {
        opcode: 6,
        kind: OperationKind::RevokeDelegate,
        layout: AccountLayout {
            session: Some(0),
            video: Some(1),
            platform: Some(2),
            viewer: Some(4),
            creator: None,
        },
    },
    // [session, video, viewer]
    OpcodeSpec {
        opcode: 7,
        kind: OperationKind::CloseSession,
        layout: AccountLayout {
            session: Some(0),
            video: Some(1),
            viewer: Some(2),
            ..AccountLayout::EMPTY
        },
    },
];

/// Look up an opcode.
pub fn lookup(opcode: u8) -> Option<&'static OpcodeSpec> {
    OPCODE_TABLE.get(usize::from(opcode))
}
