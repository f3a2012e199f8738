use thiserror::Error;

use crate::consensus::ChainError;
use crate::types::{Address, ChainName, TxHash};

/// Why a transaction does not apply to a state.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum TxError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("insufficient balance: {address} holds {available} {symbol}, needs {required}")]
    InsufficientBalance {
        address: Address,
        symbol: String,
        available: u64,
        required: u64,
    },
    #[error("token {0} already exists")]
    DuplicateSymbol(String),
    #[error("unknown token {0}")]
    UnknownSymbol(String),
    #[error("invalid token: {0}")]
    InvalidToken(&'static str),
    #[error("order {0} not found")]
    OrderNotFound(u64),
    #[error("nothing to claim: {address} is owed {owed} {symbol}, claim is for {requested}")]
    NothingToClaim {
        address: Address,
        symbol: String,
        owed: u64,
        requested: u64,
    },
    #[error("amount must be positive")]
    InvalidAmount,
    #[error("invalid order: {0}")]
    InvalidOrder(&'static str),
    #[error("order {0} is already on the book")]
    DuplicateOrder(u64),
    #[error("transaction {0} was already applied")]
    DuplicateTransaction(TxHash),
    #[error("balance overflow")]
    Overflow,
}

/// Failure to rebuild a state from recorded blocks.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// A recorded block contains a transaction that does not apply. The
    /// chain's history is inconsistent; this is not recoverable locally.
    #[error("consensus fault on {chain} at height {height}, transaction {index}: {source}")]
    ConsensusFault {
        chain: ChainName,
        height: u64,
        index: usize,
        #[source]
        source: TxError,
    },
    #[error(transparent)]
    Chain(#[from] ChainError),
}
