// DIRECTORY COMMITTEE BLOCK
// Candidate block produced by a committee round, plus the co-signatures
// collected once the round's agreement completes.
//
// INVARIANTS:
// 1. block_num is monotonic and unique across the committed chain
// 2. co_signatures are attached exactly once, after agreement; never replaced
// 3. The block hash covers the header only, so attaching co-signatures does
//    not change the identity of the block

use chrono::Utc;
use log::error;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::fmt;

/// Size in bytes of a block hash and of the round random seed derived from it.
pub const BLOCK_HASH_SIZE: usize = 32;

/// A node's public key as carried in block headers and committee entries.
///
/// Ordered by raw bytes so that key-ordered collections iterate identically
/// on every node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicKey(pub Vec<u8>);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        PublicKey(bytes.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

/// Header of a committee block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Sequence number of this block in the committee chain (first block is 1)
    pub block_num: u64,

    /// Nonce of the winning proof-of-work submission
    pub nonce: u64,

    /// Difficulty the winning submission was solved at
    pub difficulty: u8,

    /// Creation timestamp (seconds since epoch)
    pub timestamp: u64,

    /// Public key of the proof-of-work winner who joins the committee
    pub miner_pub_key: PublicKey,
}

/// Opaque consensus payload agreed on together with the header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockBody {
    /// Serialized shard (child structure) assignment
    pub sharding_structure: Vec<u8>,

    /// Serialized transaction-sharing assignment
    pub txn_sharing_assignments: Vec<u8>,
}

/// Collective signatures from the two signing rounds of the agreement protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoSignatures {
    /// Aggregated signature from the first round
    pub cs1: Vec<u8>,

    /// Participation bitmap for `cs1`, one entry per committee member
    pub b1: Vec<bool>,

    /// Aggregated signature from the second round
    pub cs2: Vec<u8>,

    /// Participation bitmap for `cs2`
    pub b2: Vec<bool>,
}

impl CoSignatures {
    /// Number of committee members that took part in the final signature.
    pub fn signer_count(&self) -> usize {
        self.b2.iter().filter(|signed| **signed).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub body: BlockBody,
    co_signatures: Option<CoSignatures>,
}

impl Block {
    /// Create a pending, unsigned candidate block stamped with the current time.
    pub fn new(block_num: u64, nonce: u64, difficulty: u8, miner_pub_key: PublicKey, body: BlockBody) -> Self {
        Self::with_timestamp(
            BlockHeader {
                block_num,
                nonce,
                difficulty,
                timestamp: Utc::now().timestamp() as u64,
                miner_pub_key,
            },
            body,
        )
    }

    pub fn with_timestamp(header: BlockHeader, body: BlockBody) -> Self {
        Block {
            header,
            body,
            co_signatures: None,
        }
    }

    /// Attach the agreement's co-signatures.
    ///
    /// Returns false and leaves the block untouched if co-signatures were
    /// already attached.
    pub fn set_co_signatures(&mut self, co_signatures: CoSignatures) -> bool {
        if self.co_signatures.is_some() {
            return false;
        }
        self.co_signatures = Some(co_signatures);
        true
    }

    pub fn co_signatures(&self) -> Option<&CoSignatures> {
        self.co_signatures.as_ref()
    }

    pub fn is_signed(&self) -> bool {
        self.co_signatures.is_some()
    }

    /// SHA3-256 over the encoded header.
    ///
    /// The header holds only integers and a byte vector, so encoding it
    /// cannot fail short of allocation failure; a failure is still logged
    /// and the hash then covers no input.
    pub fn hash(&self) -> [u8; BLOCK_HASH_SIZE] {
        let encoded = match bincode::serialize(&self.header) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!("Failed to encode header of block {}: {}", self.header.block_num, e);
                Vec::new()
            }
        };
        let mut hasher = Sha3_256::new();
        hasher.update(&encoded);
        hasher.finalize().into()
    }

    /// Encode the whole block (header, body and co-signatures).
    pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}
