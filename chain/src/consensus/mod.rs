//! Consensus engine and related abstractions.
//!
//! This module provides a modular, testable consensus layer consisting of:
//!
//! - configuration parameters ([`config::ConsensusConfig`]),
//! - proof-of-work sealing and checks ([`pow::ProofOfWork`]),
//! - single ledgers and the two-ledger registry ([`Blockchain`],
//!   [`Blockchains`]) over a pluggable [`ChainStore`],
//! - block validity predicates ([`BlockValidator`]),
//! - pending pools and block assembly ([`PendingPool`], [`Miner`]), and
//! - the [`ConsensusEngine`] tying them together.

pub mod blockchain;
pub mod config;
pub mod engine;
pub mod error;
pub mod miner;
pub mod pool;
pub mod pow;
pub mod registry;
pub mod store;
pub mod validator;

pub use blockchain::{BlockIterator, Blockchain};
pub use config::ConsensusConfig;
pub use engine::{ConsensusEngine, ImportOutcome};
pub use error::{ChainError, ConsensusError, ValidationError};
pub use miner::{Assembly, Miner};
pub use pool::{PendingPool, TxPool};
pub use pow::ProofOfWork;
pub use registry::{Blockchains, genesis_payload};
pub use store::{ChainStore, ChainTip};
pub use validator::{BlockValidator, CombinedValidator};
