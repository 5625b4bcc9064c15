// DS BLOCK FINALIZATION
// Post-agreement path of a committee round: commit the block, disseminate
// it, rotate the committee and move this node on to its next role.
//
// INVARIANTS:
// 1. Runs at most once per round, only after the engine reported `Done`
// 2. A missing winner or pending block is a fault raised before anything is
//    mutated or committed
// 3. Commit, storage and dissemination failures are logged and never stop
//    the round; a stalled committee is worse than a repairable store
// 4. Committee, candidate pool and self identity change only in the
//    `Finalizing` stage
// 5. The wait for shard micro-blocks is bounded; on timeout the next round
//    starts without them

use crate::cluster::{ClusterPlanner, LookupForwarders};
use crate::context::DsContext;
use crate::error::RoundFault;
use crate::role::{Mode, SelfIdentity};
use crate::round::{DsPhase, RoundStage};
use dsnode_core::{Block, MetaKey, PublicKey};
use dsnode_p2p::{compose_block_message, Peer};
use log::{error, info, warn};
use sha2::{Digest, Sha256};

/// What the node does after finalizing a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// Shard micro-blocks arrived in time; final-block consensus runs from there
    MicroblocksCollected,

    /// Micro-blocks timed out; final-block consensus was scheduled without them
    ProceededWithoutMicroblocks,

    /// This node left the committee and now submits transactions
    TxSubmission,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeOutcome {
    pub block_num: u64,
    pub winner: PublicKey,
    pub identity: SelfIdentity,
    pub next: NextStep,
}

pub struct BlockFinalizer;

impl BlockFinalizer {
    pub fn on_agreement_done(&self, ctx: &DsContext, _message: &[u8], _offset: usize) -> Result<FinalizeOutcome, RoundFault> {
        let (block, winner_key, winner_peer, round) = self.commit_block(ctx)?;
        info!("[round {}] DS block consensus is DONE!!!", round);

        self.store_block(ctx, &block);
        ctx.collaborators.random_seed.refresh_from_block(&block);

        let identity = ctx.role.current();
        let message = compose_block_message(&ctx.collaborators.random_seed.current_seed(), &ctx.raw_message());
        if let Some(index) = identity.consensus_index.filter(|_| identity.is_member()) {
            if LookupForwarders::from_config(&ctx.config).contains(index) {
                ctx.collaborators.broadcast.send_to_lookup_tier(&message);
                info!(
                    "[round {}] I'm part of the subset of the DS committee that will send the DSBlock to the lookup nodes",
                    round
                );
            }
            self.send_to_cluster(ctx, &block, &winner_peer, index, &message);
        }

        let identity = self.rotate(ctx, winner_key.clone(), winner_peer);

        let next = self.advance(ctx, identity, round);
        Ok(FinalizeOutcome {
            block_num: block.header.block_num,
            winner: winner_key,
            identity,
            next,
        })
    }

    /// Steps run under the round-state lock: resolve the winner, sign,
    /// serialize and commit the pending block.
    fn commit_block(&self, ctx: &DsContext) -> Result<(Block, PublicKey, Peer, u64), RoundFault> {
        let mut round = ctx.round.lock();
        let mut pending = ctx.pending.lock();

        let candidate = pending.block.as_ref().ok_or(RoundFault::NoPendingBlock)?;
        if candidate.is_signed() {
            return Err(RoundFault::AlreadySigned(candidate.header.block_num));
        }
        let winner_key = candidate.header.miner_pub_key.clone();
        let winner_peer = ctx
            .committee
            .winner_peer(&winner_key)
            .ok_or_else(|| RoundFault::WinnerMissing(winner_key.clone()))?;
        let co_signatures = round
            .session
            .as_ref()
            .ok_or(RoundFault::NoSession)?
            .engine()
            .co_signatures();

        let mut block = pending.block.take().ok_or(RoundFault::NoPendingBlock)?;
        round.stage = RoundStage::Finalizing;
        block.set_co_signatures(co_signatures);

        pending.raw_message = match block.serialize() {
            Ok(raw) => raw,
            Err(e) => {
                error!("[round {}] Failed to serialize DS block {}: {}", round.round, block.header.block_num, e);
                Vec::new()
            }
        };

        let committed = ctx.collaborators.chain.committed_length();
        if block.header.block_num != committed + 1 {
            warn!(
                "[round {}] We are missing some blocks: got block {}, chain holds {}",
                round.round, block.header.block_num, committed
            );
        }

        info!(
            "[round {}] Storing DS Block Number: {} with Nonce: {}, Difficulty: {}, Timestamp: {}, Signers: {}",
            round.round,
            block.header.block_num,
            block.header.nonce,
            block.header.difficulty,
            block.header.timestamp,
            block.co_signatures().map_or(0, |cs| cs.signer_count())
        );
        if let Err(e) = ctx.collaborators.chain.append_block(block.clone()) {
            warn!("[round {}] We failed to add pending DS block to the DS block chain: {}", round.round, e);
        }

        Ok((block, winner_key, winner_peer, round.round))
    }

    fn store_block(&self, ctx: &DsContext, block: &Block) {
        let storage = &ctx.collaborators.storage;
        let block_num = block.header.block_num;

        let raw = match block.serialize() {
            Ok(raw) => raw,
            Err(e) => {
                error!("Failed to serialize DS block {} for storage: {}", block_num, e);
                return;
            }
        };
        if let Err(e) = storage.put_block(block_num, &raw) {
            error!("Failed to store DS block {}: {}", block_num, e);
        }
        if let Err(e) = storage.mark_transaction_range(block_num) {
            error!("Failed to open transaction range for DS block {}: {}", block_num, e);
        }
        if let Err(e) = storage.put_metadata(MetaKey::LatestActiveDsBlockNum, block_num.to_string().as_bytes()) {
            error!("Failed to record latest active DS block {}: {}", block_num, e);
        }
    }

    fn send_to_cluster(&self, ctx: &DsContext, block: &Block, winner_peer: &Peer, index: usize, message: &[u8]) {
        let seed = ctx.collaborators.random_seed.current_seed();
        info!(
            "New DSBlock created with chosen nonce = {:#x}, hash = 0x{}, new DS leader (PoW winner) = {}",
            block.header.nonce,
            hex::encode(seed),
            winner_peer
        );

        let committee_len = ctx.committee.committee_len();
        let candidates = ctx.committee.candidate_snapshot();
        let plan = ClusterPlanner::plan(committee_len, candidates.len(), index, ctx.config.cluster_capacity);

        let ip = ctx.role.self_peer().printable_ip();
        let chain_len = ctx.collaborators.chain.committed_length();
        info!("[DSBLK][{:<15}][{}] BEFORE SENDING DSBLOCK", ip, chain_len);

        match plan.targets().filter(|_| plan.should_broadcast(candidates.len())) {
            Some(range) => {
                let peers: Vec<Peer> = candidates[range].iter().map(|(_, peer)| *peer).collect();
                info!("Multicasting DSBLOCK message to PoW nodes {} to {}", plan.lo, plan.hi);

                let digest = Sha256::digest(message);
                info!(
                    "[INFOR][{:<15}][{}][{}][{}] DSBLOCKGEN",
                    ip,
                    &hex::encode(digest)[..6],
                    &hex::encode(seed)[..6],
                    block.header.block_num
                );
                ctx.collaborators.broadcast.send_to_peers(&peers, message);
            }
            None => info!(
                "Cluster {} of {} has no PoW nodes to send to ({} candidates)",
                plan.cluster_index,
                plan.cluster_count,
                candidates.len()
            ),
        }

        info!("[DSBLK][{:<15}][{}] AFTER SENDING DSBLOCK", ip, chain_len);
    }

    /// Committee, pool and identity change together under the round-state
    /// lock; readers going through `DsContext::membership` never see a
    /// half-rotated committee.
    fn rotate(&self, ctx: &DsContext, winner_key: PublicKey, winner_peer: Peer) -> SelfIdentity {
        let mut round = ctx.round.lock();

        ctx.committee.rotate_in(winner_key.clone(), winner_peer);
        // The winner now leads the committee and no longer submits proof-of-work.
        ctx.committee.remove_candidate(&winner_key);
        let identity = ctx.role.advance_after_rotation(ctx.committee.committee_len());

        ctx.committee.clear_sorted_view();
        round.view_change_counter = 0;
        round.stage = RoundStage::Rotated;
        identity
    }

    fn advance(&self, ctx: &DsContext, identity: SelfIdentity, round: u64) -> NextStep {
        if identity.mode == Mode::Idle {
            ctx.collaborators.shard_node.start_tx_submission();
            return NextStep::TxSubmission;
        }

        if ctx.config.test_net_mode {
            info!("Updating shard whitelist");
            ctx.collaborators.whitelist.update_shard_whitelist();
        }

        let ticket = ctx.microblocks_collected.ticket();
        ctx.set_phase(DsPhase::MicroblockSubmission);

        match ctx.microblocks_collected.wait(ticket, ctx.config.sharding_timeout()) {
            Some(_) => NextStep::MicroblocksCollected,
            None => {
                warn!("[round {}] Timeout: Didn't receive all Microblock. Proceeds without it", round);
                ctx.collaborators.scheduler.schedule_final_block_consensus();
                NextStep::ProceededWithoutMicroblocks
            }
        }
    }
}
