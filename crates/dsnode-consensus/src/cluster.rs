// DISSEMINATION CLUSTER PLANNING
// Deterministic fan-out topology for a committed block.
//
// 1. The committee is cut into clusters of `cluster_capacity` members (the
//    last one may be short).
// 2. The candidate pool is cut into as many clusters as the committee has,
//    each ceil(pool / committee_clusters) wide.
// 3. Committee cluster k sends to pool cluster k.
//
// Every member computes its plan from the same committee and pool sizes, so
// the plans agree without exchanging any message. Rounding can make adjacent
// ranges overlap, never leave a gap.

use crate::config::ConsensusConfig;
use std::ops::RangeInclusive;

/// One committee member's dissemination assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterPlan {
    /// Index of this member's committee cluster
    pub cluster_index: usize,

    /// Number of committee clusters (and of pool clusters)
    pub cluster_count: usize,

    /// Width of every pool cluster but possibly the last
    pub pool_cluster_size: usize,

    /// First pool position assigned to this cluster
    pub lo: usize,

    /// Last pool position assigned to this cluster, clamped to the pool
    pub hi: usize,
}

impl ClusterPlan {
    /// Pool positions this member sends to; `None` when the slice is empty.
    pub fn targets(&self) -> Option<RangeInclusive<usize>> {
        if self.pool_cluster_size == 0 || self.lo > self.hi {
            None
        } else {
            Some(self.lo..=self.hi)
        }
    }

    /// Whether this member broadcasts at all.
    ///
    /// With fewer candidates than committee clusters the trailing clusters
    /// stay quiet instead of flooding the same nodes twice.
    pub fn should_broadcast(&self, pool_size: usize) -> bool {
        self.cluster_index < pool_size && self.targets().is_some()
    }
}

pub struct ClusterPlanner;

impl ClusterPlanner {
    pub fn plan(committee_size: usize, pool_size: usize, self_index: usize, cluster_capacity: usize) -> ClusterPlan {
        let capacity = cluster_capacity.max(1);
        let cluster_count = committee_size.div_ceil(capacity).max(1);
        let pool_cluster_size = pool_size.div_ceil(cluster_count);

        let cluster_index = self_index / capacity;
        let lo = cluster_index * pool_cluster_size;
        let mut hi = (lo + pool_cluster_size).saturating_sub(1);
        if hi >= pool_size {
            hi = pool_size.saturating_sub(1);
        }

        ClusterPlan {
            cluster_index,
            cluster_count,
            pool_cluster_size,
            lo,
            hi,
        }
    }
}

/// Committee positions that forward committed blocks to the lookup tier.
///
/// Placed from the nominal committee size, not the live one, so the range does
/// not move as members rotate. Both bounds are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupForwarders {
    pub lo: usize,
    pub hi: usize,
}

impl LookupForwarders {
    pub fn new(comm_size: usize, tx_sharing_cluster_size: usize) -> Self {
        let lo = comm_size / 4;
        LookupForwarders {
            lo,
            hi: lo + tx_sharing_cluster_size,
        }
    }

    pub fn from_config(config: &ConsensusConfig) -> Self {
        Self::new(config.comm_size, config.tx_sharing_cluster_size)
    }

    pub fn contains(&self, consensus_index: usize) -> bool {
        consensus_index > self.lo && consensus_index < self.hi
    }
}
