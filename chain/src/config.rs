//! Top-level configuration for a chain node.
//!
//! This module aggregates configuration for:
//!
//! - consensus parameters (`ConsensusConfig`),
//! - storage (RocksDB path and creation flags),
//! - genesis contents of the two ledgers (`GenesisConfig`),
//! - metrics exporter (enable flag + listen address).
//!
//! The goal is to have a single `ChainConfig` struct that higher-level
//! binaries can construct from defaults and override from CLI flags.

use std::net::SocketAddr;

use crate::consensus::ConsensusConfig;
use crate::storage::RocksDbConfig;

/// Contents of the genesis blocks.
///
/// Nodes with different values seal different genesis blocks. A node
/// can still adopt a peer's genesis while nothing is built on its own.
#[derive(Clone, Debug)]
pub struct GenesisConfig {
    /// Symbol of the native currency minted on `NATIVE_CHAIN`.
    pub native_symbol: String,
    /// Total native supply, minted to the coinbase account.
    pub native_supply: u64,
    pub native_decimals: u8,
    /// Amount transferred from the coinbase to `reward_address`.
    pub reward: u64,
    /// Recipient of the genesis reward.
    pub reward_address: String,
    /// Fixed timestamp so independently created genesis blocks match.
    pub timestamp: u64,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            native_symbol: "NATIVE".to_string(),
            native_supply: 21_000_000,
            native_decimals: 8,
            reward: 10,
            reward_address: "genesis".to_string(),
            timestamp: 1_700_000_000,
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Whether to run a `/metrics` HTTP exporter.
    pub enabled: bool,
    /// Address to bind the metrics HTTP server to.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        // Safe to unwrap: this is a fixed, valid address literal.
        let addr: SocketAddr = "127.0.0.1:9898"
            .parse()
            .expect("hard-coded metrics listen address should parse");
        Self {
            enabled: true,
            listen_addr: addr,
        }
    }
}

/// Top-level configuration for a chain node.
#[derive(Clone, Debug, Default)]
pub struct ChainConfig {
    pub consensus: ConsensusConfig,
    pub storage: RocksDbConfig,
    pub genesis: GenesisConfig,
    pub metrics: MetricsConfig,
}
