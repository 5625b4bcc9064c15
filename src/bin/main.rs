use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dsnode_consensus::{
    BlockHashSeed, ClusterPlanner, Collaborators, ConsensusConfig, ConsensusEngine, ConsensusSession, ConsensusState,
    DsContext, DsPhase, GateOutcome, LookupForwarders, Mode, RoundScheduler, SelfIdentity, ShardNode,
};
use dsnode_core::{Block, BlockBody, BlockChain, ChainStore, CoSignatures, MemoryBlockStorage, PublicKey};
use dsnode_p2p::{Peer, RecordingBroadcast};

#[derive(Parser)]
#[command(name = "dsnode")]
#[command(about = "Directory committee node tools", long_about = None)]
struct Cli {
    /// Node configuration file (TOML, YAML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show where a committee member sends a committed block
    Plan {
        #[arg(long)]
        committee_size: Option<usize>,
        #[arg(long)]
        pool_size: Option<usize>,
        #[arg(long)]
        index: Option<usize>,
    },

    /// Run committee rounds locally and print this node's role after each
    Simulate {
        #[arg(long, default_value_t = 5)]
        rounds: u64,
        #[arg(long)]
        committee_size: Option<usize>,
        #[arg(long)]
        pool_size: Option<usize>,
        #[arg(long)]
        index: Option<usize>,
        /// Never report shard micro-blocks, so every round waits out the sharding timeout
        #[arg(long)]
        drop_microblocks: bool,
    },
}

/// Settings of the operator tool; `consensus` holds the round policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct NodeConfig {
    consensus: ConsensusConfig,
    committee_size: usize,
    pool_size: usize,
    self_index: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            consensus: ConsensusConfig::default(),
            committee_size: 20,
            pool_size: 45,
            self_index: 0,
        }
    }
}

impl NodeConfig {
    fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("DSNODE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to read node configuration")?;

        let node: NodeConfig = settings
            .try_deserialize()
            .context("failed to parse node configuration")?;
        node.consensus.validate()?;
        if node.committee_size == 0 {
            bail!("committee_size must be > 0");
        }
        Ok(node)
    }

    fn with_overrides(mut self, committee_size: Option<usize>, pool_size: Option<usize>, index: Option<usize>) -> Result<Self> {
        self.committee_size = committee_size.unwrap_or(self.committee_size);
        self.pool_size = pool_size.unwrap_or(self.pool_size);
        self.self_index = index.unwrap_or(self.self_index);
        if self.committee_size == 0 {
            bail!("committee size must be > 0");
        }
        if self.self_index >= self.committee_size {
            bail!("index {} is outside a committee of {}", self.self_index, self.committee_size);
        }
        Ok(self)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let node = NodeConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Plan {
            committee_size,
            pool_size,
            index,
        } => plan(&node.with_overrides(committee_size, pool_size, index)?),
        Commands::Simulate {
            rounds,
            committee_size,
            pool_size,
            index,
            drop_microblocks,
        } => simulate(&node.with_overrides(committee_size, pool_size, index)?, rounds, drop_microblocks)?,
    }
    Ok(())
}

fn plan(node: &NodeConfig) {
    let consensus = &node.consensus;
    let plan = ClusterPlanner::plan(
        node.committee_size,
        node.pool_size,
        node.self_index,
        consensus.cluster_capacity,
    );

    println!(
        "committee {} / pool {} / capacity {}",
        node.committee_size, node.pool_size, consensus.cluster_capacity
    );
    println!(
        "member {} is in cluster {} of {} (pool clusters of {})",
        node.self_index, plan.cluster_index, plan.cluster_count, plan.pool_cluster_size
    );
    match plan.targets().filter(|_| plan.should_broadcast(node.pool_size)) {
        Some(range) => println!("sends to pool positions {}..={}", range.start(), range.end()),
        None => println!("sends to no pool positions"),
    }

    let forwarders = LookupForwarders::from_config(consensus);
    println!(
        "lookup forwarder: {} (indices strictly between {} and {})",
        forwarders.contains(node.self_index),
        forwarders.lo,
        forwarders.hi
    );
}

/// Engine that reaches agreement on the first message it sees.
struct InstantEngine {
    committee_size: usize,
    state: ConsensusState,
}

impl ConsensusEngine for InstantEngine {
    fn can_admit_message(&self, _message: &[u8], _offset: usize) -> bool {
        self.state == ConsensusState::Active
    }

    fn apply_message(&mut self, _message: &[u8], _offset: usize, _from: &Peer) -> bool {
        self.state = ConsensusState::Done;
        true
    }

    fn state(&self) -> ConsensusState {
        self.state
    }

    fn co_signatures(&self) -> CoSignatures {
        CoSignatures {
            cs1: vec![0x01; 64],
            b1: vec![true; self.committee_size],
            cs2: vec![0x02; 64],
            b2: vec![true; self.committee_size],
        }
    }
}

struct LoggingScheduler;

impl RoundScheduler for LoggingScheduler {
    fn schedule_final_block_consensus(&self) {
        info!("Final block consensus scheduled without the missing micro-blocks");
    }
}

struct LoggingShardNode;

impl ShardNode for LoggingShardNode {
    fn start_tx_submission(&self) {
        info!("Left the committee; starting transaction submission");
    }
}

fn sim_key(id: u64) -> PublicKey {
    PublicKey::from_bytes(&id.to_be_bytes())
}

fn sim_peer(id: u64) -> Peer {
    let [.., a, b, c] = id.to_be_bytes();
    Peer::new(IpAddr::V4(Ipv4Addr::new(10, a, b, c)), 30303)
}

fn simulate(node: &NodeConfig, rounds: u64, drop_microblocks: bool) -> Result<()> {
    let chain = Arc::new(BlockChain::new());
    let broadcast = Arc::new(RecordingBroadcast::new());
    let collaborators = Collaborators {
        chain: chain.clone(),
        storage: Arc::new(MemoryBlockStorage::new()),
        broadcast: broadcast.clone(),
        whitelist: broadcast.clone(),
        random_seed: Arc::new(BlockHashSeed::new()),
        scheduler: Arc::new(LoggingScheduler),
        shard_node: Arc::new(LoggingShardNode),
    };

    let committee = (0..node.committee_size as u64).map(|i| (sim_key(i), sim_peer(i))).collect();
    let mode = if node.self_index == 0 { Mode::Primary } else { Mode::Backup };
    let self_peer = sim_peer(node.self_index as u64);
    let ctx = Arc::new(DsContext::new(
        node.consensus.clone(),
        committee,
        SelfIdentity::member(mode, node.self_index),
        self_peer,
        collaborators,
    )?);

    // Candidate ids start past the committee so keys never collide.
    let mut next_id = node.committee_size as u64;
    for _ in 0..rounds {
        let block_num = chain.committed_length() + 1;
        let winner = next_id;
        for id in next_id..next_id + node.pool_size.max(1) as u64 {
            ctx.committee().insert_candidate(sim_key(id), sim_peer(id));
        }
        next_id += node.pool_size.max(1) as u64;

        let body = BlockBody {
            sharding_structure: block_num.to_be_bytes().to_vec(),
            txn_sharing_assignments: Vec::new(),
        };
        ctx.set_pending_block(Block::new(block_num, block_num * 7919, 5, sim_key(winner), body));
        ctx.begin_consensus(ConsensusSession::new(
            block_num,
            Box::new(InstantEngine {
                committee_size: node.committee_size,
                state: ConsensusState::Active,
            }),
        ));

        let shards = (!drop_microblocks).then(|| spawn_shard_reporter(Arc::clone(&ctx), block_num));
        let outcome = ctx.process_message(&[0x01, 0x02], 2, &sim_peer(0))?;
        if let Some(shards) = shards {
            if shards.join().is_err() {
                warn!("Micro-block reporter for round {} panicked", block_num);
            }
        }

        ctx.end_round();
        ctx.committee().clear_candidates();

        match outcome {
            GateOutcome::Finalized(outcome) => {
                println!(
                    "round {}: block {} committed, winner {}, now {} {:?}, next {:?}",
                    block_num,
                    outcome.block_num,
                    outcome.winner,
                    outcome.identity.mode,
                    outcome.identity.consensus_index,
                    outcome.next
                );
                if !outcome.identity.is_member() {
                    break;
                }
            }
            other => bail!("round {} did not finalize: {:?}", block_num, other),
        }
    }

    println!(
        "chain length {}, {} cluster broadcasts, {} lookup forwards",
        chain.committed_length(),
        broadcast.peer_messages().len(),
        broadcast.lookup_messages().len()
    );
    Ok(())
}

/// Report the round's micro-blocks once the node starts waiting for them.
fn spawn_shard_reporter(ctx: Arc<DsContext>, round: u64) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let deadline = Instant::now() + ctx.config().sharding_timeout();
        while ctx.phase() != DsPhase::MicroblockSubmission {
            // An idle node never waits for micro-blocks.
            if Instant::now() >= deadline || !ctx.identity().is_member() {
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        ctx.notify_microblocks_collected(round);
    })
}
