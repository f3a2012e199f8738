//! Chain library crate.
//!
//! This crate provides the core building blocks of a node that runs two
//! proof-of-work ledgers side by side, `NATIVE_CHAIN` for the native
//! currency and `MATCH_CHAIN` for user tokens and trading:
//!
//! - strongly-typed domain types (`types`),
//! - a modular consensus engine (`consensus`),
//! - ledger state rebuilt by replay (`state`),
//! - the limit order matching engine (`matching`),
//! - block validity predicates (`validation`),
//! - storage backends (`storage`),
//! - keys, signatures and the wallet file (`wallet`),
//! - Prometheus-based metrics (`metrics`),
//! - and a top-level node configuration (`config`).
//!
//! Higher-level binaries compose these pieces into a node.

pub mod config;
pub mod consensus;
pub mod matching;
pub mod metrics;
pub mod state;
pub mod storage;
pub mod types;
pub mod validation;
pub mod wallet;

// Re-export top-level configuration types.
pub use config::{ChainConfig, GenesisConfig, MetricsConfig};

// Re-export "core" consensus types and traits.
pub use consensus::{
    BlockValidator, Blockchain, Blockchains, ChainError, ChainStore, ChainTip, CombinedValidator,
    ConsensusConfig, ConsensusEngine, ConsensusError, ImportOutcome, Miner, PendingPool,
    ProofOfWork, TxPool, ValidationError,
};

pub use matching::{MatchingEngine, OrderBook, Price, Settlement};
pub use state::{ConsensusState, ReplayError, SignaturePolicy, StateSnapshot, TxError};

// Re-export storage backends.
pub use storage::{InMemoryChainStore, RocksDbChainStore, RocksDbConfig, StorageError};

pub use validation::{BaseValidity, PowValidity};
pub use wallet::{KeyPair, WalletError, WalletStore};

// Re-export metrics registry and consensus metrics.
pub use metrics::{ConsensusMetrics, MetricsRegistry, run_prometheus_http_server};

// Re-export domain types at the crate root for convenience.
pub use types::*;

/// Type alias for the default block validator stack used by a node.
///
/// This composes:
///
/// - [`BaseValidity`] for cheap structural checks, and
/// - [`PowValidity`] for the digest and difficulty target.
pub type DefaultBlockValidator = CombinedValidator<BaseValidity, PowValidity>;

/// Type alias for the default block store backend.
pub type DefaultChainStore = RocksDbChainStore;

/// Type alias for the default consensus engine stack.
///
/// This uses:
///
/// - [`DefaultChainStore`] (RocksDB),
/// - [`DefaultBlockValidator`] (base + proof of work).
pub type DefaultConsensusEngine = ConsensusEngine<DefaultChainStore, DefaultBlockValidator>;

/// Builds the default validator stack for `cfg`.
pub fn default_validator(cfg: &ConsensusConfig) -> DefaultBlockValidator {
    CombinedValidator::new(BaseValidity::new(cfg), PowValidity::new(cfg))
}
