//! Base validity predicate for blocks.
//!
//! This validator enforces cheap, deterministic invariants that do not
//! need ledger state, such as:
//!
//! - block size and transaction count limits,
//! - no empty blocks past genesis unless configured,
//! - no transaction recorded twice within a block,
//! - no two `CreateToken` of the same symbol within a block.

use std::collections::HashSet;

use crate::consensus::config::ConsensusConfig;
use crate::consensus::error::ValidationError;
use crate::consensus::validator::BlockValidator;
use crate::types::{Block, Transaction};

/// Base validity predicate for blocks.
///
/// This struct is configured using [`ConsensusConfig`] and performs
/// purely block-local checks that are inexpensive to run.
#[derive(Clone, Debug)]
pub struct BaseValidity {
    max_block_txs: usize,
    max_block_size_bytes: usize,
    allow_empty_blocks: bool,
}

impl BaseValidity {
    pub fn new(cfg: &ConsensusConfig) -> Self {
        Self {
            max_block_txs: cfg.max_block_txs,
            max_block_size_bytes: cfg.max_block_size_bytes,
            allow_empty_blocks: cfg.allow_empty_blocks,
        }
    }

    fn check_tx_count(&self, block: &Block) -> Result<(), ValidationError> {
        let tx_count = block.data.len();
        if tx_count > self.max_block_txs {
            return Err(ValidationError::Custom(format!(
                "block has {} txs, exceeds max_block_txs={}",
                tx_count, self.max_block_txs
            )));
        }
        if tx_count == 0 && !self.allow_empty_blocks && !block.is_genesis() {
            return Err(ValidationError::Invalid("empty block"));
        }
        Ok(())
    }

    fn check_block_size(&self, block: &Block) -> Result<(), ValidationError> {
        let size = block.canonical_bytes().len();
        if size > self.max_block_size_bytes {
            return Err(ValidationError::Custom(format!(
                "block size {} bytes exceeds max_block_size_bytes={}",
                size, self.max_block_size_bytes
            )));
        }
        Ok(())
    }

    fn check_duplicates(&self, block: &Block) -> Result<(), ValidationError> {
        let mut hashes = HashSet::new();
        let mut symbols = HashSet::new();

        for tx in &block.data {
            if !hashes.insert(tx.tx_hash()) {
                return Err(ValidationError::Invalid(
                    "duplicate transaction within the same block",
                ));
            }
            if let Transaction::CreateToken(c) = tx {
                if !symbols.insert(c.token_info.symbol.as_str()) {
                    return Err(ValidationError::Custom(format!(
                        "duplicate CreateToken for {} within the same block",
                        c.token_info.symbol
                    )));
                }
            }
        }
        Ok(())
    }
}

impl BlockValidator for BaseValidity {
    fn validate(&self, block: &Block) -> Result<(), ValidationError> {
        self.check_tx_count(block)?;
        self.check_block_size(block)?;
        self.check_duplicates(block)?;
        Ok(())
    }
}
