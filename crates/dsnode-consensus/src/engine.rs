// CONSENSUS ENGINE CAPABILITY
// The agreement protocol itself (announce, commit, challenge, response rounds
// and signature aggregation) lives outside this crate. The round pipeline
// only needs to ask whether a message fits the engine's current phase, feed
// it in, and read the terminal state.

use dsnode_core::CoSignatures;
use dsnode_p2p::Peer;

/// Externally visible state of one agreement round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusState {
    /// Messages are still being exchanged
    Active,

    /// Agreement reached; co-signatures are available
    Done,

    /// The round failed; recovery belongs to view change
    Error,
}

impl ConsensusState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsensusState::Active => "ACTIVE",
            ConsensusState::Done => "DONE",
            ConsensusState::Error => "ERROR",
        }
    }
}

/// One agreement-protocol instance.
pub trait ConsensusEngine: Send {
    /// Whether `message` is causally admissible in the engine's current phase.
    fn can_admit_message(&self, message: &[u8], offset: usize) -> bool;

    /// Apply an admitted message. Returns false if the engine rejected it.
    fn apply_message(&mut self, message: &[u8], offset: usize, from: &Peer) -> bool;

    fn state(&self) -> ConsensusState;

    /// Co-signatures of the completed round. Only meaningful in `Done`.
    fn co_signatures(&self) -> CoSignatures;
}

/// The engine instance for a single round.
pub struct ConsensusSession {
    round: u64,
    engine: Box<dyn ConsensusEngine>,
}

impl ConsensusSession {
    pub fn new(round: u64, engine: Box<dyn ConsensusEngine>) -> Self {
        ConsensusSession { round, engine }
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn engine(&self) -> &dyn ConsensusEngine {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> &mut dyn ConsensusEngine {
        self.engine.as_mut()
    }
}
