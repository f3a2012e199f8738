//! A single append-only, hash-linked ledger.
//!
//! Appends are an atomic check-and-set on the tip: the block must carry a
//! valid proof of work and build on the tip observed under the chain's
//! lock, otherwise it is rejected with [`ChainError::StaleTip`]. Each
//! chain has its own lock, so appends to one ledger never wait on the
//! other.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::info;

use super::error::ChainError;
use super::pow::ProofOfWork;
use super::store::{ChainStore, ChainTip};
use crate::types::{Block, BlockHash, ChainName};

/// One ledger backed by a shared [`ChainStore`].
pub struct Blockchain<S> {
    name: ChainName,
    store: Arc<S>,
    pow: ProofOfWork,
    tip: Mutex<Option<ChainTip>>,
}

impl<S> Blockchain<S>
where
    S: ChainStore,
{
    /// Opens the chain `name` in `store`, loading its persisted tip.
    ///
    /// A chain with no blocks yet has no tip; its first append must be a
    /// genesis block.
    pub fn open(name: ChainName, store: Arc<S>, pow: ProofOfWork) -> Result<Self, ChainError> {
        let tip = store.tip(name)?;
        Ok(Self {
            name,
            store,
            pow,
            tip: Mutex::new(tip),
        })
    }

    pub fn name(&self) -> ChainName {
        self.name
    }

    pub fn pow(&self) -> ProofOfWork {
        self.pow
    }

    // The tip is only assigned after a successful write, so the value
    // behind a poisoned lock is still consistent.
    fn lock_tip(&self) -> MutexGuard<'_, Option<ChainTip>> {
        self.tip.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn tip(&self) -> Option<ChainTip> {
        *self.lock_tip()
    }

    /// Hash of the most recently appended block; `None` before genesis.
    pub fn tip_hash(&self) -> Option<BlockHash> {
        self.tip().map(|t| t.hash)
    }

    /// Height of the tip (genesis is 0); `None` before genesis.
    pub fn height(&self) -> Option<u64> {
        self.tip().map(|t| t.height)
    }

    pub fn get_block(&self, hash: &BlockHash) -> Result<Option<Block>, ChainError> {
        Ok(self.store.get_block(self.name, hash)?)
    }

    pub fn contains(&self, hash: &BlockHash) -> Result<bool, ChainError> {
        Ok(self.get_block(hash)?.is_some())
    }

    /// Lazily walks the chain from the current tip back to genesis.
    ///
    /// The walk is pinned to the tip observed at call time; blocks
    /// appended afterwards are not visible. Request a new iterator to
    /// see them.
    pub fn iter(&self) -> BlockIterator<'_, S> {
        let tip = self.tip();
        BlockIterator {
            chain: self,
            next: tip.map(|t| t.hash),
            remaining: tip.map_or(0, |t| t.height + 1),
        }
    }

    /// All blocks ordered oldest first, the order replay needs.
    pub fn blocks_from_genesis(&self) -> Result<Vec<Block>, ChainError> {
        let mut blocks = self.iter().collect::<Result<Vec<_>, _>>()?;
        blocks.reverse();
        Ok(blocks)
    }

    /// Validates and appends `block`, returning the new tip.
    ///
    /// Fails with [`ChainError::InvalidProofOfWork`] if the stored hash is
    /// not the block's digest or misses the target, and with
    /// [`ChainError::StaleTip`] if `block` does not build on the current
    /// tip. Neither failure changes any state.
    pub fn add_block(&self, block: Block) -> Result<ChainTip, ChainError> {
        if !self.pow.validate(&block) {
            return Err(ChainError::InvalidProofOfWork(block.hash));
        }

        let mut guard = self.lock_tip();
        let current = guard.map(|t| t.hash);
        if block.header.prev_block_hash != current {
            return Err(ChainError::StaleTip {
                expected: current,
                found: block.header.prev_block_hash,
            });
        }

        let new_tip = ChainTip {
            hash: block.hash,
            height: guard.map_or(0, |t| t.height + 1),
        };
        self.store.append(self.name, &block, new_tip)?;
        *guard = Some(new_tip);

        info!(
            chain = %self.name,
            height = new_tip.height,
            hash = %new_tip.hash,
            txs = block.data.len(),
            "appended block"
        );
        Ok(new_tip)
    }

    /// Swaps the genesis of a chain that has nothing built on it yet for
    /// `genesis`. The replaced block stays in the store, unreferenced.
    ///
    /// Fails with [`ChainError::GenesisInUse`] once the chain is past
    /// height 0.
    pub fn replace_genesis(&self, genesis: Block) -> Result<ChainTip, ChainError> {
        if !genesis.is_genesis() {
            return Err(ChainError::NotGenesis(genesis.hash));
        }
        if !self.pow.validate(&genesis) {
            return Err(ChainError::InvalidProofOfWork(genesis.hash));
        }

        let mut guard = self.lock_tip();
        if let Some(tip) = *guard {
            if tip.height > 0 {
                return Err(ChainError::GenesisInUse {
                    chain: self.name,
                    height: tip.height,
                });
            }
        }

        let new_tip = ChainTip {
            hash: genesis.hash,
            height: 0,
        };
        self.store.append(self.name, &genesis, new_tip)?;
        let old = guard.replace(new_tip);
        info!(
            chain = %self.name,
            old = ?old.map(|t| t.hash),
            hash = %new_tip.hash,
            "replaced genesis block"
        );
        Ok(new_tip)
    }
}

/// Iterator over a chain from tip to genesis; see [`Blockchain::iter`].
///
/// Yields at most `height + 1` blocks, so it terminates even over a
/// corrupted store.
pub struct BlockIterator<'a, S> {
    chain: &'a Blockchain<S>,
    next: Option<BlockHash>,
    remaining: u64,
}

impl<S> Iterator for BlockIterator<'_, S>
where
    S: ChainStore,
{
    type Item = Result<Block, ChainError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let hash = self.next.take()?;
        self.remaining -= 1;

        match self.chain.get_block(&hash) {
            Ok(Some(block)) => {
                self.next = block.header.prev_block_hash;
                Some(Ok(block))
            }
            Ok(None) => {
                self.remaining = 0;
                Some(Err(ChainError::BlockNotFound(hash)))
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e))
            }
        }
    }
}
