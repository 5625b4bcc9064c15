// CONSENSUS MESSAGE GATE
// Causal admission of committee-block consensus messages.
//
// The agreement protocol has a fixed phase order, but the network does not
// deliver in that order: a late-phase message can reach a node whose engine
// (or whose whole round) has not caught up yet. Instead of rejecting such a
// message the gate parks it until the engine says it fits, bounded by the
// ordering window.
//
// INVARIANTS:
// 1. At most one message is between admission and application at a time:
//    the ordering lock is held from a successful admission until the engine
//    has applied the message
// 2. A message is applied only if the engine admitted it under the same
//    ordering lock
// 3. While the node resynchronizes every message is rejected, never parked
// 4. The readiness wait runs before admission, so round-driver state changes
//    never queue behind a message that is waiting for its round

use crate::config::ConsensusConfig;
use crate::context::DsContext;
use crate::engine::ConsensusState;
use crate::error::RoundFault;
use crate::finalizer::{BlockFinalizer, FinalizeOutcome};
use crate::role::Mode;
use crate::round::{DsPhase, RoundStage, SyncType, ViewChangeEvent};
use dsnode_p2p::Peer;
use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// What happened to one inbound consensus message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Applied; the round is still running
    Applied { accepted: bool },

    /// Applied and the round reached agreement; the block was finalized
    Finalized(FinalizeOutcome),

    /// Applied and the round failed; view change takes over
    AgreementFailed,

    /// Not admissible within the ordering window; dropped
    OrderTimeout,

    /// The node is resynchronizing; dropped
    Resyncing,

    /// Admitted, but the node is not in the consensus phase; ignored
    WrongPhase,
}

enum Admissibility {
    Admissible,
    NotYet,
    Reject,
}

/// Proof of admission. Holds the ordering lock until dropped.
pub struct Admission<'a> {
    _order: MutexGuard<'a, ()>,
}

pub struct ConsensusMessageGate {
    order: Mutex<()>,
    order_cv: Condvar,
    window: Duration,
    object_timeout: Duration,
}

impl ConsensusMessageGate {
    pub fn new(config: &ConsensusConfig) -> Self {
        ConsensusMessageGate {
            order: Mutex::new(()),
            order_cv: Condvar::new(),
            window: config.message_order_window(),
            object_timeout: config.consensus_object_timeout(),
        }
    }

    /// Wake every parked message so it re-checks admissibility.
    ///
    /// Must not be called while holding an [`Admission`].
    pub fn notify_state_changed(&self) {
        let _order = self.order.lock();
        self.order_cv.notify_all();
    }

    /// Block until `message` is admissible or the ordering window elapses.
    pub fn admit<'a>(&'a self, ctx: &DsContext, message: &[u8], offset: usize) -> Result<Admission<'a>, GateOutcome> {
        let mut order = self.order.lock();
        let deadline = Instant::now() + self.window;

        loop {
            match Self::admissibility(ctx, message, offset) {
                Admissibility::Admissible => return Ok(Admission { _order: order }),
                Admissibility::Reject => return Err(GateOutcome::Resyncing),
                Admissibility::NotYet => {}
            }

            if self.order_cv.wait_until(&mut order, deadline).timed_out() {
                return match Self::admissibility(ctx, message, offset) {
                    Admissibility::Admissible => Ok(Admission { _order: order }),
                    Admissibility::Reject => Err(GateOutcome::Resyncing),
                    Admissibility::NotYet => {
                        warn!("Timeout while waiting for correct order of DS Block consensus messages");
                        Err(GateOutcome::OrderTimeout)
                    }
                };
            }
        }
    }

    fn admissibility(ctx: &DsContext, message: &[u8], offset: usize) -> Admissibility {
        let round = ctx.round.lock();
        if round.sync != SyncType::NoSync {
            warn!("The node started the process of rejoining, ignore rest of consensus msg");
            return Admissibility::Reject;
        }

        match round.session.as_ref() {
            None => {
                debug!("[round {}] Consensus session has not been initialized", round.round);
                Admissibility::NotYet
            }
            Some(session) if session.engine().can_admit_message(message, offset) => Admissibility::Admissible,
            Some(_) => Admissibility::NotYet,
        }
    }

    /// Admit, apply and, on agreement, finalize one inbound message.
    pub fn process_message(
        &self,
        ctx: &DsContext,
        message: &[u8],
        offset: usize,
        from: &Peer,
    ) -> Result<GateOutcome, RoundFault> {
        self.await_consensus_ready(ctx);

        let admission = match self.admit(ctx, message, offset) {
            Ok(admission) => admission,
            Err(outcome) => return Ok(outcome),
        };

        let mut guard = ctx.round.lock();
        let round = &mut *guard;
        if round.phase != DsPhase::DsBlockConsensus {
            info!("[round {}] Ignoring consensus message in phase {:?}", round.round, round.phase);
            return Ok(GateOutcome::WrongPhase);
        }

        round.stage = RoundStage::Applying;
        let (accepted, state) = match round.session.as_mut() {
            Some(session) => {
                let accepted = session.engine_mut().apply_message(message, offset, from);
                (accepted, session.engine().state())
            }
            None => {
                round.stage = RoundStage::AwaitingMessage;
                return Ok(GateOutcome::WrongPhase);
            }
        };
        let round_num = round.round;

        match state {
            ConsensusState::Done => {
                round.view_change_counter = 0;
                drop(guard);
                ctx.view_change.notify(ViewChangeEvent::RoundCommitted { round: round_num });

                if ctx.role.current().mode == Mode::Primary {
                    info!(
                        "[DSCON][{:<15}][{}] DONE",
                        ctx.role.self_peer().printable_ip(),
                        ctx.collaborators.chain.committed_length()
                    );
                }

                // Later rounds may start arriving while this one rotates.
                drop(admission);
                let outcome = BlockFinalizer.on_agreement_done(ctx, message, offset)?;
                Ok(GateOutcome::Finalized(outcome))
            }
            ConsensusState::Error => {
                info!("[round {}] Oops, no consensus reached - waiting for view change", round_num);
                info!(
                    "[round {}] Candidate pool size is {}. Check the number of PoW submissions received",
                    round_num,
                    ctx.committee.candidate_count()
                );
                round.view_change_counter = 0;
                round.stage = RoundStage::AwaitingViewChange;
                drop(guard);
                ctx.view_change.notify(ViewChangeEvent::AgreementFailed { round: round_num });
                Ok(GateOutcome::AgreementFailed)
            }
            ConsensusState::Active => {
                info!("[round {}] Consensus state = {}", round_num, state.as_str());
                round.stage = RoundStage::AwaitingMessage;
                drop(guard);
                self.order_cv.notify_all();
                Ok(GateOutcome::Applied { accepted })
            }
        }
    }

    /// Give the round driver a chance to finish creating the round when a
    /// message shows up while the node is still preparing it.
    ///
    /// Runs without the ordering lock. Phase changes, session installs and
    /// resync all proceed while a message waits here.
    fn await_consensus_ready(&self, ctx: &DsContext) {
        let ticket = ctx.consensus_ready.ticket();
        let (preparing, round) = {
            let round = ctx.round.lock();
            (round.sync == SyncType::NoSync && round.phase.precedes_consensus(), round.round)
        };
        if !preparing {
            return;
        }

        ctx.consensus_prep.notify(round);
        if ctx.consensus_ready.wait(ticket, self.object_timeout).is_none() {
            warn!(
                "[round {}] Time out while waiting for state transition and consensus object creation",
                round
            );
        }
        info!("[round {}] State transition and consensus object creation completed (check for timeout)", round);
    }
}
