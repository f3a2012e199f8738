//! Storage abstraction used by the blockchains.

use serde::{Deserialize, Serialize};

use crate::storage::StorageError;
use crate::types::{Block, BlockHash, ChainName};

/// Tip record of one chain: the last appended block and its height.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChainTip {
    pub hash: BlockHash,
    /// Genesis is height 0.
    pub height: u64,
}

/// Abstract storage interface shared by every chain of a registry.
///
/// Implementations can be backed by in-memory maps, RocksDB, etc. Each
/// chain's blocks and tip are namespaced by [`ChainName`], so appends to
/// one chain never touch another chain's keys. Serialising appends to the
/// same chain is the caller's job (see
/// [`Blockchain::add_block`](super::Blockchain::add_block)).
pub trait ChainStore: Send + Sync {
    /// Fetches a block by hash, if present.
    fn get_block(&self, chain: ChainName, hash: &BlockHash) -> Result<Option<Block>, StorageError>;

    /// Returns the persisted tip of `chain`, if any block was appended.
    fn tip(&self, chain: ChainName) -> Result<Option<ChainTip>, StorageError>;

    /// Persists `block` and moves the tip to `tip` as one atomic write.
    fn append(&self, chain: ChainName, block: &Block, tip: ChainTip) -> Result<(), StorageError>;
}
