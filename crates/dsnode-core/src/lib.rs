// === Blocks ===
pub mod block;

// === Chain and storage collaborators ===
pub mod blockchain;
pub mod storage;

// === Re-exports for broader workspace access ===
pub use block::{Block, BlockBody, BlockHeader, CoSignatures, PublicKey, BLOCK_HASH_SIZE};
pub use blockchain::{BlockChain, ChainError, ChainStore};
pub use storage::{MemoryBlockStorage, MetaKey, PersistentStorage, StorageError};
