use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("write rejected: {0}")]
    WriteRejected(String),

    #[error("storage backend unavailable")]
    Unavailable,
}

/// Keys of node metadata entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaKey {
    /// Sequence number of the latest committed committee block, as decimal text
    LatestActiveDsBlockNum,
}

/// Durable block storage.
pub trait PersistentStorage: Send + Sync {
    fn put_block(&self, block_num: u64, bytes: &[u8]) -> Result<(), StorageError>;

    fn put_metadata(&self, key: MetaKey, bytes: &[u8]) -> Result<(), StorageError>;

    /// Open the transaction-body range that belongs to this block number.
    fn mark_transaction_range(&self, block_num: u64) -> Result<(), StorageError>;
}

/// Storage kept entirely in memory.
#[derive(Default)]
pub struct MemoryBlockStorage {
    blocks: RwLock<BTreeMap<u64, Vec<u8>>>,
    metadata: RwLock<HashMap<MetaKey, Vec<u8>>>,
    tx_ranges: RwLock<BTreeSet<u64>>,
}

impl MemoryBlockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_block(&self, block_num: u64) -> Option<Vec<u8>> {
        self.blocks.read().get(&block_num).cloned()
    }

    pub fn get_metadata(&self, key: MetaKey) -> Option<Vec<u8>> {
        self.metadata.read().get(&key).cloned()
    }

    pub fn has_transaction_range(&self, block_num: u64) -> bool {
        self.tx_ranges.read().contains(&block_num)
    }
}

impl PersistentStorage for MemoryBlockStorage {
    fn put_block(&self, block_num: u64, bytes: &[u8]) -> Result<(), StorageError> {
        self.blocks.write().insert(block_num, bytes.to_vec());
        Ok(())
    }

    fn put_metadata(&self, key: MetaKey, bytes: &[u8]) -> Result<(), StorageError> {
        self.metadata.write().insert(key, bytes.to_vec());
        Ok(())
    }

    fn mark_transaction_range(&self, block_num: u64) -> Result<(), StorageError> {
        self.tx_ranges.write().insert(block_num);
        Ok(())
    }
}
