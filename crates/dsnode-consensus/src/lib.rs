// === Round plumbing ===
pub mod config;
pub mod context;
pub mod error;
pub mod round;
pub mod signal;

// === Committee state ===
pub mod committee;
pub mod role;

// === Agreement and finalization ===
pub mod cluster;
pub mod collaborators;
pub mod engine;
pub mod finalizer;
pub mod gate;

pub use cluster::{ClusterPlan, ClusterPlanner, LookupForwarders};
pub use collaborators::{BlockHashSeed, RandomSeedRegistry, RoundScheduler, ShardNode};
pub use committee::{CandidatePool, Committee, CommitteeStore, RankedSubmission};
pub use config::ConsensusConfig;
pub use context::{Collaborators, DsContext};
pub use engine::{ConsensusEngine, ConsensusSession, ConsensusState};
pub use error::{ConfigError, RoundFault};
pub use finalizer::{BlockFinalizer, FinalizeOutcome, NextStep};
pub use gate::{Admission, ConsensusMessageGate, GateOutcome};
pub use role::{Mode, SelfIdentity, SelfRoleTracker};
pub use round::{DsPhase, RoundStage, SyncType, ViewChangeEvent};
pub use signal::{Signal, Ticket};
