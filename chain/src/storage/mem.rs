//! In-memory chain store.
//!
//! This implementation is useful for unit tests, benchmarks, and small
//! devnets. It keeps all blocks in a `HashMap` keyed by chain and
//! `BlockHash` and tracks each chain's tip separately.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::consensus::store::{ChainStore, ChainTip};
use crate::storage::StorageError;
use crate::types::{Block, BlockHash, ChainName};

#[derive(Default)]
struct Inner {
    blocks: HashMap<(ChainName, BlockHash), Block>,
    tips: HashMap<ChainName, ChainTip>,
}

/// In-memory implementation of [`ChainStore`].
#[derive(Default)]
pub struct InMemoryChainStore {
    inner: RwLock<Inner>,
}

impl InMemoryChainStore {
    /// Creates a new, empty in-memory chain store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of blocks currently stored across all chains.
    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.blocks.len()).unwrap_or(0)
    }

    /// Returns `true` if no blocks are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChainStore for InMemoryChainStore {
    fn get_block(&self, chain: ChainName, hash: &BlockHash) -> Result<Option<Block>, StorageError> {
        let inner = self.inner.read().map_err(|_| StorageError::Poisoned)?;
        Ok(inner.blocks.get(&(chain, *hash)).cloned())
    }

    fn tip(&self, chain: ChainName) -> Result<Option<ChainTip>, StorageError> {
        let inner = self.inner.read().map_err(|_| StorageError::Poisoned)?;
        Ok(inner.tips.get(&chain).copied())
    }

    fn append(&self, chain: ChainName, block: &Block, tip: ChainTip) -> Result<(), StorageError> {
        let mut inner = self.inner.write().map_err(|_| StorageError::Poisoned)?;
        inner.blocks.insert((chain, block.hash), block.clone());
        inner.tips.insert(chain, tip);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HASH_LEN, Hash256, Header};

    fn dummy_block(byte: u8) -> Block {
        Block {
            header: Header {
                prev_block_hash: None,
                timestamp: 1_700_000_000,
                nonce: byte as u64,
            },
            data: Vec::new(),
            hash: BlockHash(Hash256([byte; HASH_LEN])),
        }
    }

    #[test]
    fn append_and_get_block_roundtrip() {
        let store = InMemoryChainStore::new();
        let block = dummy_block(1);
        let tip = ChainTip {
            hash: block.hash,
            height: 0,
        };

        store.append(ChainName::Native, &block, tip).expect("append");

        let fetched = store
            .get_block(ChainName::Native, &block.hash)
            .expect("read")
            .expect("block should be present");
        assert_eq!(fetched, block);
        assert_eq!(store.tip(ChainName::Native).expect("tip"), Some(tip));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn chains_are_namespaced() {
        let store = InMemoryChainStore::new();
        let block = dummy_block(2);
        store
            .append(
                ChainName::Match,
                &block,
                ChainTip {
                    hash: block.hash,
                    height: 0,
                },
            )
            .expect("append");

        assert!(store.tip(ChainName::Native).expect("tip").is_none());
        assert!(
            store
                .get_block(ChainName::Native, &block.hash)
                .expect("read")
                .is_none()
        );
    }
}
