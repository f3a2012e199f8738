//! RocksDB-backed chain store.
//!
//! One RocksDB instance holds every chain. Data lives in dedicated column
//! families:
//!
//! - `"blocks"`: maps `chain-name || 0x00 || BlockHash` -> canonical block bytes,
//! - `"meta"`:   maps `chain-name` -> encoded [`ChainTip`] (tip hash + height).
//!
//! A block and its tip record are written in a single `WriteBatch`, so a
//! crash never leaves a tip pointing at a missing block.

use std::path::Path;

use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options, WriteBatch};

use crate::consensus::store::{ChainStore, ChainTip};
use crate::storage::StorageError;
use crate::types::{Block, BlockHash, ChainName};

const CF_BLOCKS: &str = "blocks";
const CF_META: &str = "meta";

/// Configuration for [`RocksDbChainStore`].
#[derive(Clone, Debug)]
pub struct RocksDbConfig {
    /// Filesystem path to the RocksDB database directory.
    pub path: String,
    /// Whether to create the database and missing column families if they
    /// do not yet exist.
    pub create_if_missing: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: "blockchain.db".to_string(),
            create_if_missing: true,
        }
    }
}

/// RocksDB-backed implementation of [`ChainStore`].
pub struct RocksDbChainStore {
    db: DB,
}

impl RocksDbChainStore {
    /// Opens (or creates) a RocksDB-backed chain store at the given path.
    ///
    /// This sets up the `"blocks"` and `"meta"` column families. The
    /// `"default"` column family is also created to keep RocksDB happy,
    /// but it is not currently used.
    pub fn open(cfg: &RocksDbConfig) -> Result<Self, StorageError> {
        let path = Path::new(&cfg.path);

        let mut opts = Options::default();
        opts.create_if_missing(cfg.create_if_missing);
        opts.create_missing_column_families(cfg.create_if_missing);

        let cfs = vec![
            ColumnFamilyDescriptor::new("default", Options::default()),
            ColumnFamilyDescriptor::new(CF_BLOCKS, Options::default()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cfs)?;

        Ok(Self { db })
    }

    fn cf_blocks(&self) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(CF_BLOCKS)
            .ok_or(StorageError::MissingColumnFamily(CF_BLOCKS))
    }

    fn cf_meta(&self) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(CF_META)
            .ok_or(StorageError::MissingColumnFamily(CF_META))
    }

    fn block_key(chain: ChainName, hash: &BlockHash) -> Vec<u8> {
        let name = chain.as_str().as_bytes();
        let mut key = Vec::with_capacity(name.len() + 1 + hash.as_bytes().len());
        key.extend_from_slice(name);
        key.push(0);
        key.extend_from_slice(hash.as_bytes());
        key
    }

    fn encode_tip(tip: &ChainTip) -> Result<Vec<u8>, StorageError> {
        let cfg = bincode::config::standard();
        bincode::serde::encode_to_vec(tip, cfg)
            .map_err(|_| StorageError::CorruptedMeta("tip record encode"))
    }

    fn decode_tip(bytes: &[u8]) -> Result<ChainTip, StorageError> {
        let cfg = bincode::config::standard();
        let (tip, _): (ChainTip, usize) = bincode::serde::decode_from_slice(bytes, cfg)
            .map_err(|_| StorageError::CorruptedMeta("tip record decode"))?;
        Ok(tip)
    }
}

impl ChainStore for RocksDbChainStore {
    fn get_block(&self, chain: ChainName, hash: &BlockHash) -> Result<Option<Block>, StorageError> {
        let cf = self.cf_blocks()?;
        match self.db.get_cf(cf, Self::block_key(chain, hash))? {
            None => Ok(None),
            Some(bytes) => Block::from_canonical_bytes(&bytes)
                .map(Some)
                .ok_or(StorageError::CorruptedBlock(*hash)),
        }
    }

    fn tip(&self, chain: ChainName) -> Result<Option<ChainTip>, StorageError> {
        let cf = self.cf_meta()?;
        match self.db.get_cf(cf, chain.as_str().as_bytes())? {
            None => Ok(None),
            Some(bytes) => Self::decode_tip(&bytes).map(Some),
        }
    }

    fn append(&self, chain: ChainName, block: &Block, tip: ChainTip) -> Result<(), StorageError> {
        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf_blocks()?,
            Self::block_key(chain, &block.hash),
            block.canonical_bytes(),
        );
        batch.put_cf(
            self.cf_meta()?,
            chain.as_str().as_bytes(),
            Self::encode_tip(&tip)?,
        );
        self.db.write(batch)?;
        Ok(())
    }
}
