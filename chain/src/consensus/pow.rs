//! Proof-of-work sealing and validation.
//!
//! A block is valid under a difficulty target of `n` bits when its stored
//! hash equals the recomputed [`block_digest`] and that digest has at least
//! `n` leading zero bits. Sealing searches nonces until that holds.

use crate::types::block::{block_digest, payload_bytes};
use crate::types::{Block, BlockHash, Header, Transaction};

/// How many nonces are tried between two polls of the abort signal.
const ABORT_POLL_INTERVAL: u64 = 1024;

/// Upper bound on a meaningful target; a BLAKE3 digest has 256 bits.
pub const MAX_DIFFICULTY_BITS: u32 = 256;

/// Proof-of-work parameters for one chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ProofOfWork {
    difficulty_bits: u32,
}

impl ProofOfWork {
    pub fn new(difficulty_bits: u32) -> Self {
        Self {
            difficulty_bits: difficulty_bits.min(MAX_DIFFICULTY_BITS),
        }
    }

    pub fn difficulty_bits(&self) -> u32 {
        self.difficulty_bits
    }

    /// Returns `true` if `hash` has at least the target number of leading
    /// zero bits.
    pub fn meets_target(&self, hash: &BlockHash) -> bool {
        hash.0.leading_zero_bits() >= self.difficulty_bits
    }

    /// Recomputes the digest from the block's stored fields and checks it
    /// against both the stored hash and the target.
    pub fn validate(&self, block: &Block) -> bool {
        let recomputed = block.compute_hash();
        recomputed == block.hash && self.meets_target(&recomputed)
    }

    /// Searches nonces for a hash meeting the target and returns the sealed
    /// block.
    ///
    /// `should_abort` is polled every [`ABORT_POLL_INTERVAL`] attempts
    /// (and before the first one). Returns `None` if it fires, or if the
    /// whole nonce space is exhausted; a partially searched block is never
    /// returned.
    pub fn seal<F>(
        &self,
        prev_block_hash: Option<BlockHash>,
        data: Vec<Transaction>,
        timestamp: u64,
        should_abort: F,
    ) -> Option<Block>
    where
        F: Fn() -> bool,
    {
        let payload = payload_bytes(&data);
        let mut nonce: u64 = 0;

        loop {
            if nonce % ABORT_POLL_INTERVAL == 0 && should_abort() {
                return None;
            }

            let hash = block_digest(prev_block_hash.as_ref(), &payload, nonce, timestamp);
            if self.meets_target(&hash) {
                return Some(Block {
                    header: Header {
                        prev_block_hash,
                        timestamp,
                        nonce,
                    },
                    data,
                    hash,
                });
            }

            nonce = nonce.checked_add(1)?;
        }
    }
}
