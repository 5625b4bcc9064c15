// Shared fixtures for the round pipeline integration tests.
#![allow(dead_code)]

use dsnode_consensus::{
    BlockHashSeed, Collaborators, ConsensusConfig, ConsensusEngine, ConsensusSession, ConsensusState, DsContext,
    GateOutcome, Mode, RoundFault, RoundScheduler, SelfIdentity, ShardNode,
};
use dsnode_core::{
    Block, BlockBody, BlockChain, BlockHeader, ChainError, ChainStore, CoSignatures, MemoryBlockStorage, MetaKey,
    PersistentStorage, PublicKey, StorageError,
};
use dsnode_p2p::{Peer, RecordingBroadcast};
use parking_lot::Mutex;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Offset of the phase byte in a scripted consensus message.
pub const OFFSET: usize = 2;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn key(i: u16) -> PublicKey {
    PublicKey::from_bytes(&i.to_be_bytes())
}

pub fn peer(i: u16) -> Peer {
    Peer::new(IpAddr::V4(Ipv4Addr::new(10, 0, (i >> 8) as u8, i as u8)), 30303)
}

pub fn winner_key() -> PublicKey {
    key(1000)
}

pub fn winner_peer() -> Peer {
    peer(1000)
}

/// Candidate-pool members other than the winner sort after it.
pub fn pool_member(i: u16) -> (PublicKey, Peer) {
    (key(2000 + i), peer(2000 + i))
}

pub fn consensus_message(phase: u8) -> Vec<u8> {
    vec![0x01, 0x02, phase]
}

pub fn expected_co_signatures() -> CoSignatures {
    CoSignatures {
        cs1: vec![0xc1; 8],
        b1: vec![true, true, false, true],
        cs2: vec![0xc2; 8],
        b2: vec![true, true, true, false],
    }
}

pub fn test_config() -> ConsensusConfig {
    ConsensusConfig {
        message_order_window_ms: 2_000,
        consensus_object_timeout_ms: 100,
        sharding_timeout_ms: 50,
        ..ConsensusConfig::default()
    }
}

/// What the scripted engine observed.
#[derive(Default)]
pub struct EngineRecord {
    pub applied: Mutex<Vec<u8>>,
    in_apply: AtomicBool,
    pub overlaps: AtomicUsize,
    pub inadmissible_applied: AtomicUsize,
}

/// Engine that expects phases 0..phases in order, one message per phase.
pub struct ScriptedEngine {
    next_phase: u8,
    phases: u8,
    outcome: ConsensusState,
    state: ConsensusState,
    record: Arc<EngineRecord>,
}

impl ScriptedEngine {
    pub fn new(phases: u8, outcome: ConsensusState, record: Arc<EngineRecord>) -> Self {
        ScriptedEngine {
            next_phase: 0,
            phases,
            outcome,
            state: ConsensusState::Active,
            record,
        }
    }
}

impl ConsensusEngine for ScriptedEngine {
    fn can_admit_message(&self, message: &[u8], offset: usize) -> bool {
        self.state == ConsensusState::Active && message.get(offset) == Some(&self.next_phase)
    }

    fn apply_message(&mut self, message: &[u8], offset: usize, _from: &Peer) -> bool {
        if self.record.in_apply.swap(true, Ordering::SeqCst) {
            self.record.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        if !self.can_admit_message(message, offset) {
            self.record.inadmissible_applied.fetch_add(1, Ordering::SeqCst);
            self.record.in_apply.store(false, Ordering::SeqCst);
            return false;
        }

        self.record.applied.lock().push(self.next_phase);
        thread::sleep(Duration::from_millis(2));
        self.next_phase += 1;
        if self.next_phase == self.phases {
            self.state = self.outcome;
        }
        self.record.in_apply.store(false, Ordering::SeqCst);
        true
    }

    fn state(&self) -> ConsensusState {
        self.state
    }

    fn co_signatures(&self) -> CoSignatures {
        expected_co_signatures()
    }
}

#[derive(Default)]
pub struct CountingScheduler {
    pub scheduled: AtomicUsize,
}

impl RoundScheduler for CountingScheduler {
    fn schedule_final_block_consensus(&self) {
        self.scheduled.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct CountingShardNode {
    pub started: AtomicUsize,
}

impl ShardNode for CountingShardNode {
    fn start_tx_submission(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
}

/// Chain whose appends always fail.
pub struct FailingChain;

impl ChainStore for FailingChain {
    fn append_block(&self, _block: Block) -> Result<u64, ChainError> {
        Err(ChainError::Unavailable("disk full".to_string()))
    }

    fn last_block(&self) -> Option<Block> {
        None
    }

    fn committed_length(&self) -> u64 {
        0
    }
}

/// Storage whose writes always fail.
pub struct FailingStorage;

impl PersistentStorage for FailingStorage {
    fn put_block(&self, _block_num: u64, _bytes: &[u8]) -> Result<(), StorageError> {
        Err(StorageError::Unavailable)
    }

    fn put_metadata(&self, _key: MetaKey, _bytes: &[u8]) -> Result<(), StorageError> {
        Err(StorageError::Unavailable)
    }

    fn mark_transaction_range(&self, _block_num: u64) -> Result<(), StorageError> {
        Err(StorageError::Unavailable)
    }
}

pub struct HarnessOptions {
    pub committee_size: u16,
    pub identity: SelfIdentity,
    pub pool_size: u16,
    pub winner_in_pool: bool,
    pub phases: u8,
    pub outcome: ConsensusState,
    pub config: ConsensusConfig,
    pub chain: Option<Arc<dyn ChainStore>>,
    pub storage: Option<Arc<dyn PersistentStorage>>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        HarnessOptions {
            committee_size: 20,
            identity: SelfIdentity::member(Mode::Backup, 5),
            pool_size: 10,
            winner_in_pool: true,
            phases: 1,
            outcome: ConsensusState::Done,
            config: test_config(),
            chain: None,
            storage: None,
        }
    }
}

pub struct Harness {
    pub ctx: Arc<DsContext>,
    pub chain: Arc<BlockChain>,
    pub storage: Arc<MemoryBlockStorage>,
    pub broadcast: Arc<RecordingBroadcast>,
    pub seed: Arc<BlockHashSeed>,
    pub scheduler: Arc<CountingScheduler>,
    pub shard_node: Arc<CountingShardNode>,
    pub record: Arc<EngineRecord>,
    phases: u8,
    outcome: ConsensusState,
    block_num: u64,
}

impl Harness {
    pub fn new(options: HarnessOptions) -> Self {
        init_logging();
        let chain = Arc::new(BlockChain::new());
        let storage = Arc::new(MemoryBlockStorage::new());
        let broadcast = Arc::new(RecordingBroadcast::new());
        let seed = Arc::new(BlockHashSeed::new());
        let scheduler = Arc::new(CountingScheduler::default());
        let shard_node = Arc::new(CountingShardNode::default());

        let collaborators = Collaborators {
            chain: options.chain.unwrap_or_else(|| chain.clone() as Arc<dyn ChainStore>),
            storage: options.storage.unwrap_or_else(|| storage.clone() as Arc<dyn PersistentStorage>),
            broadcast: broadcast.clone(),
            whitelist: broadcast.clone(),
            random_seed: seed.clone(),
            scheduler: scheduler.clone(),
            shard_node: shard_node.clone(),
        };
        let block_num = collaborators.chain.committed_length() + 1;

        let committee = (0..options.committee_size).map(|i| (key(i), peer(i))).collect();
        let self_peer = options
            .identity
            .consensus_index
            .map(|i| peer(i as u16))
            .unwrap_or_else(|| peer(999));
        let ctx = DsContext::new(options.config, committee, options.identity, self_peer, collaborators)
            .expect("test config is valid");

        if options.winner_in_pool {
            ctx.committee().insert_candidate(winner_key(), winner_peer());
        }
        for i in 0..options.pool_size {
            let (key, peer) = pool_member(i);
            ctx.committee().insert_candidate(key, peer);
        }
        ctx.committee().record_sorted_submission(5, winner_key());
        ctx.set_pending_block(pending_block(block_num));

        Harness {
            ctx: Arc::new(ctx),
            chain,
            storage,
            broadcast,
            seed,
            scheduler,
            shard_node,
            record: Arc::new(EngineRecord::default()),
            phases: options.phases,
            outcome: options.outcome,
            block_num,
        }
    }

    pub fn block_num(&self) -> u64 {
        self.block_num
    }

    pub fn session(&self) -> ConsensusSession {
        let engine = ScriptedEngine::new(self.phases, self.outcome, self.record.clone());
        ConsensusSession::new(self.block_num, Box::new(engine))
    }

    /// Install the round's session and enter the consensus phase.
    pub fn start_round(&self) {
        self.ctx.begin_consensus(self.session());
    }

    pub fn deliver(&self, phase: u8) -> Result<GateOutcome, RoundFault> {
        self.ctx.process_message(&consensus_message(phase), OFFSET, &peer(0))
    }

    pub fn applied(&self) -> Vec<u8> {
        self.record.applied.lock().clone()
    }
}

pub fn pending_block(block_num: u64) -> Block {
    Block::with_timestamp(
        BlockHeader {
            block_num,
            nonce: 0x5eed,
            difficulty: 5,
            timestamp: 1_700_000_000,
            miner_pub_key: winner_key(),
        },
        BlockBody {
            sharding_structure: vec![1, 2, 3],
            txn_sharing_assignments: vec![4, 5],
        },
    )
}
