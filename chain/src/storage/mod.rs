//! Storage backends for the chain.
//!
//! This module provides concrete implementations of the
//! [`crate::consensus::store::ChainStore`] trait, including:
//!
//! - an in-memory store ([`mem::InMemoryChainStore`]) suitable for tests,
//! - a RocksDB-backed store ([`rocksdb::RocksDbChainStore`]) shared by
//!   both ledgers of a persistent node.

use thiserror::Error;

use crate::types::BlockHash;

pub mod mem;
pub mod rocksdb;

pub use mem::InMemoryChainStore;
pub use self::rocksdb::{RocksDbChainStore, RocksDbConfig};

/// Storage-level error type.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying RocksDB error.
    #[error("rocksdb: {0}")]
    RocksDb(#[from] ::rocksdb::Error),
    /// Required column family was not found.
    #[error("missing column family {0}")]
    MissingColumnFamily(&'static str),
    /// Corrupted or malformed metadata (e.g. tip record that fails to decode).
    #[error("corrupted metadata: {0}")]
    CorruptedMeta(&'static str),
    /// Stored block bytes do not decode.
    #[error("corrupted block {0}")]
    CorruptedBlock(BlockHash),
    /// A writer panicked while holding the in-memory store lock.
    #[error("storage lock poisoned")]
    Poisoned,
}
