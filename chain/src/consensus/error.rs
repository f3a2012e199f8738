use thiserror::Error;

use crate::state::{ReplayError, TxError};
use crate::storage::StorageError;
use crate::types::{BlockHash, ChainName};

/// Error type returned when a block fails a validity predicate.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Block is invalid according to a validity predicate.
    #[error("invalid block: {0}")]
    Invalid(&'static str),
    /// Block is invalid with a dynamic error message.
    #[error("invalid block: {0}")]
    Custom(String),
}

/// Errors raised by a [`Blockchain`](super::Blockchain) or the chain
/// registry.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Another append won the race for the tip this block was built on.
    #[error("stale tip: block builds on {}, current tip is {}", fmt_tip(.found), fmt_tip(.expected))]
    StaleTip {
        expected: Option<BlockHash>,
        found: Option<BlockHash>,
    },
    /// Stored hash does not match the recomputed digest or misses the
    /// difficulty target.
    #[error("invalid proof of work for block {0}")]
    InvalidProofOfWork(BlockHash),
    /// A block's parent is not where the chain says it should be.
    #[error("chain linkage broken: block builds on {}, expected {}", fmt_tip(.found), fmt_tip(.expected))]
    ChainLinkageBroken {
        expected: Option<BlockHash>,
        found: Option<BlockHash>,
    },
    #[error("unknown chain: {0}")]
    UnknownChain(String),
    #[error("block {0} not found")]
    BlockNotFound(BlockHash),
    #[error("failed to seal genesis block for {0}")]
    GenesisSealFailed(ChainName),
    /// Blocks are already built on the genesis that was to be replaced.
    #[error("{chain} is at height {height}; its genesis cannot be replaced")]
    GenesisInUse { chain: ChainName, height: u64 },
    #[error("block {0} is not a genesis block")]
    NotGenesis(BlockHash),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

fn fmt_tip(hash: &Option<BlockHash>) -> String {
    match hash {
        Some(h) => h.to_string(),
        None => "<genesis>".to_string(),
    }
}

/// High-level errors that can occur in the consensus engine.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// A submitted or imported transaction was rejected.
    #[error("transaction rejected on {chain}: {source}")]
    Transaction {
        chain: ChainName,
        #[source]
        source: TxError,
    },
    /// A peer block carried a transaction that does not apply to our tip.
    #[error("block {hash} rejected: transaction {index} invalid: {source}")]
    InvalidBlockTransaction {
        hash: BlockHash,
        index: usize,
        #[source]
        source: TxError,
    },
    /// Underlying validation failure.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// Recorded history does not replay; see [`ReplayError`].
    #[error(transparent)]
    Replay(#[from] ReplayError),
    /// Proof-of-work search was interrupted before sealing.
    #[error("mining cancelled")]
    Cancelled,
}

impl From<StorageError> for ConsensusError {
    fn from(e: StorageError) -> Self {
        ConsensusError::Chain(ChainError::Storage(e))
    }
}
