// Narrow interfaces to the node components that surround a committee round.

use dsnode_core::{Block, BLOCK_HASH_SIZE};
use log::debug;
use parking_lot::RwLock;

/// Shared round randomness derived from the latest committed block.
pub trait RandomSeedRegistry: Send + Sync {
    fn refresh_from_block(&self, block: &Block);

    fn current_seed(&self) -> [u8; BLOCK_HASH_SIZE];
}

/// Seed equal to the hash of the latest committed block.
#[derive(Default)]
pub struct BlockHashSeed {
    seed: RwLock<[u8; BLOCK_HASH_SIZE]>,
}

impl BlockHashSeed {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RandomSeedRegistry for BlockHashSeed {
    fn refresh_from_block(&self, block: &Block) {
        let hash = block.hash();
        debug!("Round seed refreshed from block {}: {}", block.header.block_num, hex::encode(&hash[..6]));
        *self.seed.write() = hash;
    }

    fn current_seed(&self) -> [u8; BLOCK_HASH_SIZE] {
        *self.seed.read()
    }
}

/// Starts the next committee round.
pub trait RoundScheduler: Send + Sync {
    /// Start final-block consensus without waiting for the remaining shard
    /// micro-blocks. Must not block the caller.
    fn schedule_final_block_consensus(&self);
}

/// The node's non-committee role.
pub trait ShardNode: Send + Sync {
    /// Take over as a transaction-submission participant after leaving the committee.
    fn start_tx_submission(&self);
}
