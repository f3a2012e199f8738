//! Shared application state.

use std::sync::Arc;

use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use dexchain::{
    Blockchains, ChainConfig, ConsensusEngine, DefaultConsensusEngine, MetricsRegistry,
    RocksDbChainStore, default_validator,
};

use crate::error::NodeError;
use crate::peers::PeerClient;

/// Shared state held by the API and background tasks.
///
/// This is wrapped in an [`Arc`] and passed to request handlers via Axum's
/// `State` extractor.
pub struct AppState {
    /// Consensus engine over both ledgers (storage + validators + pools).
    pub engine: Arc<DefaultConsensusEngine>,
    /// Peers that mined blocks are announced to.
    pub peers: Vec<PeerClient>,
    /// Metrics registry shared between consensus and the API.
    pub metrics: Arc<MetricsRegistry>,
    /// Fired on shutdown; stops the miners mid-search.
    pub cancel: CancellationToken,
}

impl AppState {
    /// Runs `f` against the engine on the blocking thread pool.
    ///
    /// Engine calls take the per-chain locks, may replay a whole chain and
    /// read RocksDB, so request handlers never call them inline.
    pub async fn blocking<T, F>(&self, f: F) -> Result<T, JoinError>
    where
        F: FnOnce(&DefaultConsensusEngine) -> T + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || f(&engine)).await
    }
}

/// Thread-safe alias for `AppState`.
pub type SharedState = Arc<AppState>;

/// Opens the RocksDB store at `cfg.storage` and loads (or creates) both
/// ledgers on it.
pub fn open_engine(
    cfg: &ChainConfig,
    metrics: Arc<MetricsRegistry>,
) -> Result<DefaultConsensusEngine, NodeError> {
    let store = Arc::new(RocksDbChainStore::open(&cfg.storage)?);
    let chains = Blockchains::create_or_load(store, &cfg.consensus, &cfg.genesis)?;
    let validator = default_validator(&cfg.consensus);
    Ok(ConsensusEngine::new(
        cfg.consensus.clone(),
        chains,
        validator,
        cfg.genesis.native_symbol.clone(),
    )
    .with_metrics(metrics))
}
