// DIRECTORY COMMITTEE ROUND CONTEXT
// Everything one committee node shares across the threads that drive a round.
//
// LOCK ORDER (never acquired in reverse):
//   gate ordering lock -> round state -> pending block -> candidate pool
//   round state -> committee -> role
// Rotation mutates committee, pool and role while holding the round state.
// Signals are leaf locks and may be notified while holding any of the above.

use crate::collaborators::{RandomSeedRegistry, RoundScheduler, ShardNode};
use crate::committee::{Committee, CommitteeStore};
use crate::config::ConsensusConfig;
use crate::engine::ConsensusSession;
use crate::error::{ConfigError, RoundFault};
use crate::finalizer::FinalizeOutcome;
use crate::gate::{ConsensusMessageGate, GateOutcome};
use crate::role::{SelfIdentity, SelfRoleTracker};
use crate::round::{DsPhase, PendingRound, RoundStage, RoundState, SyncType, ViewChangeEvent};
use crate::signal::Signal;
use dsnode_core::{Block, ChainStore, PersistentStorage};
use dsnode_p2p::{NetworkBroadcast, Peer, ShardWhitelist};
use log::info;
use parking_lot::Mutex;
use std::sync::Arc;

/// External components a committee round talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub chain: Arc<dyn ChainStore>,
    pub storage: Arc<dyn PersistentStorage>,
    pub broadcast: Arc<dyn NetworkBroadcast>,
    pub whitelist: Arc<dyn ShardWhitelist>,
    pub random_seed: Arc<dyn RandomSeedRegistry>,
    pub scheduler: Arc<dyn RoundScheduler>,
    pub shard_node: Arc<dyn ShardNode>,
}

pub struct DsContext {
    pub(crate) config: ConsensusConfig,
    pub(crate) round: Mutex<RoundState>,
    pub(crate) pending: Mutex<PendingRound>,
    pub(crate) committee: CommitteeStore,
    pub(crate) role: SelfRoleTracker,
    pub(crate) collaborators: Collaborators,
    pub(crate) gate: ConsensusMessageGate,

    /// Raised when an early message wants the leader to start the round
    pub(crate) consensus_prep: Signal<u64>,
    /// Raised when the round's session exists and the phase allows consensus
    pub(crate) consensus_ready: Signal<u64>,
    /// Raised when the shard micro-blocks for this round are all in
    pub(crate) microblocks_collected: Signal<u64>,
    pub(crate) view_change: Signal<ViewChangeEvent>,
}

impl DsContext {
    pub fn new(
        config: ConsensusConfig,
        committee: Committee,
        identity: SelfIdentity,
        self_peer: Peer,
        collaborators: Collaborators,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let round = collaborators.chain.committed_length() + 1;

        Ok(DsContext {
            gate: ConsensusMessageGate::new(&config),
            config,
            round: Mutex::new(RoundState::new(round)),
            pending: Mutex::new(PendingRound::default()),
            committee: CommitteeStore::new(committee),
            role: SelfRoleTracker::new(identity, self_peer),
            collaborators,
            consensus_prep: Signal::new(),
            consensus_ready: Signal::new(),
            microblocks_collected: Signal::new(),
            view_change: Signal::new(),
        })
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn committee(&self) -> &CommitteeStore {
        &self.committee
    }

    pub fn identity(&self) -> SelfIdentity {
        self.role.current()
    }

    /// Committee and this node's identity as one consistent pair.
    ///
    /// Rotation holds the round-state lock, so the pair never mixes the
    /// committee of one round with the identity of another.
    pub fn membership(&self) -> (Committee, SelfIdentity) {
        let _round = self.round.lock();
        (self.committee.committee_snapshot(), self.role.current())
    }

    /// Run one inbound consensus message through the gate.
    pub fn process_message(&self, message: &[u8], offset: usize, from: &Peer) -> Result<GateOutcome, RoundFault> {
        self.gate.process_message(self, message, offset, from)
    }

    /// Install the candidate block that the coming round agrees on.
    pub fn set_pending_block(&self, block: Block) {
        let mut pending = self.pending.lock();
        pending.block = Some(block);
        pending.raw_message.clear();
    }

    /// Serialized round message of the last finalized block.
    pub fn raw_message(&self) -> Vec<u8> {
        self.pending.lock().raw_message.clone()
    }

    /// Install the round's session without changing phase.
    pub fn install_session(&self, session: ConsensusSession) {
        {
            let mut round = self.round.lock();
            round.round = session.round();
            round.stage = RoundStage::AwaitingMessage;
            round.session = Some(session);
        }
        self.gate.notify_state_changed();
    }

    /// Install the round's session and enter the consensus phase.
    pub fn begin_consensus(&self, session: ConsensusSession) {
        let round = session.round();
        self.install_session(session);
        self.set_phase(DsPhase::DsBlockConsensus);
        info!("[round {}] DS block consensus started", round);
    }

    pub fn set_phase(&self, phase: DsPhase) {
        let ready_round = {
            let mut round = self.round.lock();
            round.phase = phase;
            (phase == DsPhase::DsBlockConsensus && round.session.is_some()).then_some(round.round)
        };
        if let Some(round) = ready_round {
            self.consensus_ready.notify(round);
        }
        self.gate.notify_state_changed();
    }

    pub fn phase(&self) -> DsPhase {
        self.round.lock().phase
    }

    pub fn stage(&self) -> RoundStage {
        self.round.lock().stage
    }

    pub fn set_sync(&self, sync: SyncType) {
        let round = {
            let mut round = self.round.lock();
            round.sync = sync;
            round.round
        };
        if sync != SyncType::NoSync {
            // Messages waiting for the round to be prepared go straight to rejection.
            self.consensus_ready.notify(round);
        }
        self.gate.notify_state_changed();
    }

    /// Drop the round's session once the round driver is done with it.
    pub fn end_round(&self) {
        self.round.lock().session = None;
    }

    pub fn record_round_failure(&self) -> u32 {
        let mut round = self.round.lock();
        round.view_change_counter += 1;
        round.view_change_counter
    }

    pub fn view_change_counter(&self) -> u32 {
        self.round.lock().view_change_counter
    }

    /// Report that every shard micro-block for `round` has been collected.
    pub fn notify_microblocks_collected(&self, round: u64) {
        self.microblocks_collected.notify(round);
    }

    pub fn consensus_prep_signal(&self) -> &Signal<u64> {
        &self.consensus_prep
    }

    pub fn view_change_signal(&self) -> &Signal<ViewChangeEvent> {
        &self.view_change
    }

    /// Run finalization for a round whose engine reported `Done`.
    ///
    /// Must not be called while holding an admission from the gate.
    pub fn finalize(&self, message: &[u8], offset: usize) -> Result<FinalizeOutcome, RoundFault> {
        crate::finalizer::BlockFinalizer.on_agreement_done(self, message, offset)
    }
}
