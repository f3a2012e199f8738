//! Proof-of-work validity predicate.

use crate::consensus::config::ConsensusConfig;
use crate::consensus::error::ValidationError;
use crate::consensus::pow::ProofOfWork;
use crate::consensus::validator::BlockValidator;
use crate::types::Block;

/// Rejects blocks whose stored hash is not their digest or misses the
/// difficulty target.
#[derive(Clone, Copy, Debug)]
pub struct PowValidity {
    pow: ProofOfWork,
}

impl PowValidity {
    pub fn new(cfg: &ConsensusConfig) -> Self {
        Self {
            pow: ProofOfWork::new(cfg.difficulty_bits),
        }
    }
}

impl BlockValidator for PowValidity {
    fn validate(&self, block: &Block) -> Result<(), ValidationError> {
        if block.compute_hash() != block.hash {
            return Err(ValidationError::Custom(format!(
                "block {} does not hash to its stored hash",
                block.hash
            )));
        }
        if !self.pow.meets_target(&block.hash) {
            return Err(ValidationError::Custom(format!(
                "block {} misses the {}-bit difficulty target",
                block.hash,
                self.pow.difficulty_bits()
            )));
        }
        Ok(())
    }
}
