// COMMITTEE BLOCK CHAIN
// Append-only sequence of committed committee blocks.

use crate::block::Block;
use log::debug;
use parking_lot::RwLock;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("block {block_num} is not newer than the chain tip {tip}")]
    StaleBlock { block_num: u64, tip: u64 },

    #[error("block {0} carries no co-signatures")]
    Unsigned(u64),

    #[error("chain store unavailable: {0}")]
    Unavailable(String),
}

/// Append-only store of committed blocks.
pub trait ChainStore: Send + Sync {
    /// Append a committed block, returning its position in the chain.
    fn append_block(&self, block: Block) -> Result<u64, ChainError>;

    /// The most recently committed block, if any.
    fn last_block(&self) -> Option<Block>;

    /// Number of blocks committed so far.
    fn committed_length(&self) -> u64;
}

/// In-memory chain used by a node that keeps only the recent committee history.
#[derive(Default)]
pub struct BlockChain {
    blocks: RwLock<Vec<Block>>,
}

impl BlockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a committed block by its sequence number.
    pub fn get_block(&self, block_num: u64) -> Option<Block> {
        self.blocks
            .read()
            .iter()
            .find(|block| block.header.block_num == block_num)
            .cloned()
    }
}

impl ChainStore for BlockChain {
    fn append_block(&self, block: Block) -> Result<u64, ChainError> {
        if !block.is_signed() {
            return Err(ChainError::Unsigned(block.header.block_num));
        }

        let mut blocks = self.blocks.write();
        if let Some(tip) = blocks.last() {
            if block.header.block_num <= tip.header.block_num {
                return Err(ChainError::StaleBlock {
                    block_num: block.header.block_num,
                    tip: tip.header.block_num,
                });
            }
        }

        debug!("Appending block {} at position {}", block.header.block_num, blocks.len());
        blocks.push(block);
        Ok(blocks.len() as u64 - 1)
    }

    fn last_block(&self) -> Option<Block> {
        self.blocks.read().last().cloned()
    }

    fn committed_length(&self) -> u64 {
        self.blocks.read().len() as u64
    }
}
