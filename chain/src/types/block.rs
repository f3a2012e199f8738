// chain/src/types/block.rs

//! Block types and hashing.
//!
//! This module defines the core block data structures used by both
//! ledgers, together with the canonical digest a block's proof-of-work is
//! computed over.
//!
//! Serialization is done with **bincode 2** using the `serde` integration
//! (`bincode::serde::encode_to_vec`) and an explicit `standard()` config.
//! The same canonical encoding is used everywhere we need block bytes.

use serde::{Deserialize, Serialize};

use super::{Hash256, Transaction};

/// Strongly-typed block hash.
///
/// This is the proof-of-work digest of a [`Block`]: BLAKE3-256 over the
/// previous hash, the canonical payload bytes, the nonce and the
/// timestamp (see [`block_digest`]).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockHash(pub Hash256);

impl BlockHash {
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Display for BlockHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Block header: the fields covered by the proof-of-work digest besides
/// the payload itself.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// Hash of the tip this block was built on; `None` only for genesis.
    pub prev_block_hash: Option<BlockHash>,

    /// Wall-clock timestamp of the block, in seconds since Unix epoch.
    ///
    /// Informational only: ordering comes from hash linkage.
    pub timestamp: u64,

    /// Proof-of-work search variable.
    pub nonce: u64,
}

/// Block = header + ordered transaction payload + sealed hash.
///
/// A block is immutable once sealed: `hash` is fixed by the fields it was
/// computed over and re-checked by every validator.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub header: Header,
    /// Ordered list of transactions recorded by this block.
    pub data: Vec<Transaction>,
    pub hash: BlockHash,
}

/// Canonical bincode-2 bytes of a block payload.
///
/// # Panics
///
/// Panics if encoding fails. This is considered a programming error,
/// because all fields are required to be serializable.
pub fn payload_bytes(data: &[Transaction]) -> Vec<u8> {
    let cfg = bincode::config::standard();
    bincode::serde::encode_to_vec(data, cfg)
        .expect("block payload should always be serializable with bincode 2 + serde")
}

/// Proof-of-work digest over `(prevBlockHash, data, nonce, timestamp)`.
///
/// `payload` must be the output of [`payload_bytes`]. The previous hash
/// is tagged and the payload length-prefixed so that no two distinct
/// headers share an input.
pub fn block_digest(
    prev: Option<&BlockHash>,
    payload: &[u8],
    nonce: u64,
    timestamp: u64,
) -> BlockHash {
    let mut hasher = blake3::Hasher::new();
    match prev {
        Some(p) => {
            hasher.update(&[1u8]);
            hasher.update(p.as_bytes());
        }
        None => {
            hasher.update(&[0u8]);
        }
    }
    hasher.update(&(payload.len() as u64).to_le_bytes());
    hasher.update(payload);
    hasher.update(&nonce.to_le_bytes());
    hasher.update(&timestamp.to_le_bytes());
    BlockHash(Hash256(*hasher.finalize().as_bytes()))
}

impl Block {
    /// Returns the canonical byte representation of the whole block, as
    /// persisted by the storage backends.
    ///
    /// # Panics
    ///
    /// Panics if encoding fails (see [`payload_bytes`]).
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let cfg = bincode::config::standard();
        bincode::serde::encode_to_vec(self, cfg)
            .expect("Block should always be serializable with bincode 2 + serde")
    }

    /// Decodes a block previously produced by [`Block::canonical_bytes`].
    pub fn from_canonical_bytes(bytes: &[u8]) -> Option<Block> {
        let cfg = bincode::config::standard();
        let (block, _): (Block, usize) = bincode::serde::decode_from_slice(bytes, cfg).ok()?;
        Some(block)
    }

    /// Recomputes the digest from the stored fields, ignoring `hash`.
    pub fn compute_hash(&self) -> BlockHash {
        block_digest(
            self.header.prev_block_hash.as_ref(),
            &payload_bytes(&self.data),
            self.header.nonce,
            self.header.timestamp,
        )
    }

    pub fn is_genesis(&self) -> bool {
        self.header.prev_block_hash.is_none()
    }

    /// Previous hash as raw bytes: empty for genesis, 32 bytes otherwise.
    pub fn prev_hash_bytes(&self) -> &[u8] {
        match &self.header.prev_block_hash {
            Some(h) => h.as_bytes(),
            None => &[],
        }
    }
}
