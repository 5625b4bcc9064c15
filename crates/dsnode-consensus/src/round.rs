// Per-round state shared between the message gate, the finalizer and the
// round driver.

use crate::engine::ConsensusSession;
use dsnode_core::Block;

/// Local phase of the committee node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DsPhase {
    /// Collecting proof-of-work submissions for the next block
    PowSubmission,

    /// Leader selected; the round's session is being created
    DsBlockConsensusPrep,

    /// Agreement on the committee block is running
    DsBlockConsensus,

    /// Block committed; waiting for shard micro-blocks
    MicroblockSubmission,

    /// Agreement on the final block is running
    FinalBlockConsensus,
}

impl DsPhase {
    /// Phases in which a consensus message may arrive before the round's
    /// session is ready to take it.
    pub fn precedes_consensus(&self) -> bool {
        matches!(self, DsPhase::PowSubmission | DsPhase::DsBlockConsensusPrep)
    }
}

/// Resynchronization mode of the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncType {
    NoSync,
    /// Fresh node joining the network
    NewSync,
    /// Shard node catching up
    NormalSync,
    /// Committee node rejoining
    DsSync,
}

/// Progress of the current round through this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundStage {
    AwaitingMessage,
    Applying,
    /// Committee, pool and self identity may be mutated only here
    Finalizing,
    Rotated,
    /// Handed to view change; terminal for this crate
    AwaitingViewChange,
}

pub struct RoundState {
    pub round: u64,
    pub phase: DsPhase,
    pub stage: RoundStage,
    pub sync: SyncType,
    pub session: Option<ConsensusSession>,
    /// Consecutive failed rounds observed by view change
    pub view_change_counter: u32,
}

impl RoundState {
    pub fn new(round: u64) -> Self {
        RoundState {
            round,
            phase: DsPhase::PowSubmission,
            stage: RoundStage::AwaitingMessage,
            sync: SyncType::NoSync,
            session: None,
            view_change_counter: 0,
        }
    }
}

/// The candidate block of the current round and its serialized round message.
#[derive(Default)]
pub struct PendingRound {
    pub block: Option<Block>,
    pub raw_message: Vec<u8>,
}

/// Notification for the view-change layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewChangeEvent {
    RoundCommitted { round: u64 },
    AgreementFailed { round: u64 },
}
