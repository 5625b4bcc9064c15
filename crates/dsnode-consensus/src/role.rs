// SELF ROLE TRACKING
// Strict seniority rotation: each round one member enters at rank 0 and the
// oldest leaves from the tail, so every surviving member moves down one rank.

use dsnode_p2p::Peer;
use log::info;
use parking_lot::Mutex;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Rank 0: leads the next committee round
    Primary,

    /// Any other committee rank
    Backup,

    /// Not a committee member
    Idle,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Primary => "PRIMARY_DS",
            Mode::Backup => "BACKUP_DS",
            Mode::Idle => "IDLE",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// This node's committee role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelfIdentity {
    pub mode: Mode,

    /// Committee position; `None` when idle
    pub consensus_index: Option<usize>,
}

impl SelfIdentity {
    pub fn member(mode: Mode, consensus_index: usize) -> Self {
        SelfIdentity {
            mode,
            consensus_index: Some(consensus_index),
        }
    }

    pub fn idle() -> Self {
        SelfIdentity {
            mode: Mode::Idle,
            consensus_index: None,
        }
    }

    pub fn is_member(&self) -> bool {
        self.mode != Mode::Idle
    }
}

/// Role after one rotation, given the role before it.
pub fn advance(was_primary: bool, index: usize, committee_size: usize) -> (Mode, Option<usize>) {
    if was_primary {
        (Mode::Backup, Some(index + 1))
    } else if index + 1 == committee_size {
        (Mode::Idle, None)
    } else {
        (Mode::Backup, Some(index + 1))
    }
}

pub struct SelfRoleTracker {
    identity: Mutex<SelfIdentity>,
    self_peer: Peer,
}

impl SelfRoleTracker {
    pub fn new(identity: SelfIdentity, self_peer: Peer) -> Self {
        SelfRoleTracker {
            identity: Mutex::new(identity),
            self_peer,
        }
    }

    pub fn current(&self) -> SelfIdentity {
        *self.identity.lock()
    }

    pub fn self_peer(&self) -> Peer {
        self.self_peer
    }

    /// Apply one committee rotation to this node's role.
    ///
    /// An idle node stays idle; it re-enters only by winning a later round.
    pub fn advance_after_rotation(&self, committee_size: usize) -> SelfIdentity {
        let mut identity = self.identity.lock();
        let Some(index) = identity.consensus_index.filter(|_| identity.is_member()) else {
            return *identity;
        };

        let (mode, consensus_index) = advance(identity.mode == Mode::Primary, index, committee_size);
        match (identity.mode, mode) {
            (Mode::Primary, _) => info!("I am now just a backup DS"),
            (_, Mode::Idle) => info!("I am the oldest backup DS -> now kicked out of DS committee"),
            _ => {}
        }
        *identity = SelfIdentity { mode, consensus_index };

        match consensus_index {
            Some(index) => info!("[IDENT][{:<15}][{:<6}] DSBK", self.self_peer.printable_ip(), index),
            None => info!("[IDENT][{:<15}][      ] IDLE", self.self_peer.printable_ip()),
        }
        *identity
    }
}
