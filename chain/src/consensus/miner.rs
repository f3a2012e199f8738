//! Block assembly.
//!
//! The miner turns pending transactions into a block on top of a tip: it
//! re-validates candidates in order against the tip's state, keeps those
//! that still apply and hands them to the proof-of-work search.

use tracing::debug;

use super::config::ConsensusConfig;
use super::pool::TxPool;
use crate::state::{ConsensusState, SignaturePolicy, TxError};
use crate::types::{Transaction, TxHash};

/// Candidates sorted into what goes into the block and what is dropped.
#[derive(Debug, Default)]
pub struct Assembly {
    /// Transactions that apply in this order on the tip state.
    pub txs: Vec<Transaction>,
    /// Pooled transactions that no longer apply.
    pub evicted: Vec<(TxHash, TxError)>,
}

/// Configurable block assembler.
///
/// This struct is stateless with respect to the chain; it is handed the
/// tip state and a [`TxPool`] at call time.
#[derive(Clone, Debug)]
pub struct Miner {
    pub max_block_txs: usize,
    pub max_block_size_bytes: usize,
    pub allow_empty_blocks: bool,
}

impl Miner {
    /// Constructs a miner from a [`ConsensusConfig`].
    pub fn from_config(cfg: &ConsensusConfig) -> Self {
        Self {
            max_block_txs: cfg.max_block_txs,
            max_block_size_bytes: cfg.max_block_size_bytes,
            allow_empty_blocks: cfg.allow_empty_blocks,
        }
    }

    /// Selects the block payload from `pool` on top of `state`.
    ///
    /// Candidates are applied to a scratch copy in pool order, so a
    /// transaction that depends on an earlier one in the same block is
    /// accepted, and one invalidated by an earlier one is evicted.
    /// Signatures were checked at admission and are not re-verified.
    pub fn assemble<P>(&self, state: &ConsensusState, pool: &P) -> Assembly
    where
        P: TxPool,
    {
        // Leave room for the block envelope around the payload.
        let budget = self.max_block_size_bytes.saturating_sub(128);
        let candidates = pool.select_for_block(self.max_block_txs, budget);

        let mut scratch = state.clone();
        let mut assembly = Assembly::default();
        for tx in candidates {
            match scratch.apply(&tx, SignaturePolicy::Trust) {
                Ok(_) => assembly.txs.push(tx),
                Err(e) => {
                    debug!(kind = tx.kind(), error = %e, "evicting pending transaction");
                    assembly.evicted.push((tx.tx_hash(), e));
                }
            }
        }
        assembly
    }

    /// Whether an assembly is worth sealing.
    pub fn should_seal(&self, assembly: &Assembly) -> bool {
        !assembly.txs.is_empty() || self.allow_empty_blocks
    }
}
