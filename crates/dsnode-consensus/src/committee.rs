// COMMITTEE AND CANDIDATE POOL
// Sole owner of the ordered committee, the proof-of-work candidate pool and
// the pool's difficulty-sorted view.
//
// INVARIANTS:
// 1. Committee size never changes: rotation inserts one member and evicts one
// 2. Rank 0 is the newest member (the current primary); the tail is the oldest
// 3. The pool iterates in public-key order on every node
// 4. Readers receive snapshots, never references into the locked collections

use dsnode_core::PublicKey;
use dsnode_p2p::Peer;
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, VecDeque};

/// Ordered committee members, newest first.
pub type Committee = VecDeque<(PublicKey, Peer)>;

/// Nodes that submitted a qualifying proof-of-work for the next round.
pub type CandidatePool = BTreeMap<PublicKey, Peer>;

/// A pool entry ranked for leader selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedSubmission {
    pub difficulty: u8,
    pub pub_key: PublicKey,
}

pub struct CommitteeStore {
    committee: RwLock<Committee>,
    candidates: Mutex<CandidatePool>,
    sorted_view: Mutex<Vec<RankedSubmission>>,
}

impl CommitteeStore {
    pub fn new(committee: Committee) -> Self {
        CommitteeStore {
            committee: RwLock::new(committee),
            candidates: Mutex::new(CandidatePool::new()),
            sorted_view: Mutex::new(Vec::new()),
        }
    }

    pub fn committee_len(&self) -> usize {
        self.committee.read().len()
    }

    pub fn committee_snapshot(&self) -> Committee {
        self.committee.read().clone()
    }

    /// Insert the round's winner at rank 0 and evict the oldest member.
    ///
    /// Returns the evicted member.
    pub fn rotate_in(&self, winner_key: PublicKey, winner_peer: Peer) -> Option<(PublicKey, Peer)> {
        let mut committee = self.committee.write();
        let size = committee.len();
        committee.push_front((winner_key, winner_peer));
        let evicted = committee.pop_back();
        debug_assert_eq!(committee.len(), size, "rotation must preserve committee size");

        if let Some((key, peer)) = &evicted {
            info!("Committee rotated: {} {} left, {} {} joined", key, peer, committee[0].0, winner_peer);
        }
        evicted
    }

    pub fn insert_candidate(&self, pub_key: PublicKey, peer: Peer) {
        self.candidates.lock().insert(pub_key, peer);
    }

    /// Drop a single pool entry.
    pub fn remove_candidate(&self, pub_key: &PublicKey) -> Option<Peer> {
        let removed = self.candidates.lock().remove(pub_key);
        if removed.is_some() {
            debug!("Removed {} from candidate pool", pub_key);
        }
        removed
    }

    /// Address of a pool entry.
    pub fn winner_peer(&self, pub_key: &PublicKey) -> Option<Peer> {
        self.candidates.lock().get(pub_key).copied()
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.lock().len()
    }

    /// Pool entries in iteration order.
    pub fn candidate_snapshot(&self) -> Vec<(PublicKey, Peer)> {
        self.candidates
            .lock()
            .iter()
            .map(|(key, peer)| (key.clone(), *peer))
            .collect()
    }

    pub fn clear_candidates(&self) {
        self.candidates.lock().clear();
    }

    /// Record a submission in the difficulty-sorted view (hardest first).
    pub fn record_sorted_submission(&self, difficulty: u8, pub_key: PublicKey) {
        let mut sorted = self.sorted_view.lock();
        let at = sorted.partition_point(|entry| entry.difficulty >= difficulty);
        sorted.insert(at, RankedSubmission { difficulty, pub_key });
    }

    pub fn sorted_view(&self) -> Vec<RankedSubmission> {
        self.sorted_view.lock().clone()
    }

    pub fn clear_sorted_view(&self) {
        self.sorted_view.lock().clear();
    }
}
