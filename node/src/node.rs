//! The `node` subcommand: RPC server, startup sync and background miners.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use dexchain::{
    Block, ChainConfig, ChainError, ChainName, ConsensusError, DefaultConsensusEngine,
    ImportOutcome, MetricsRegistry, run_prometheus_http_server,
};

use crate::cli::NodeArgs;
use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::peers::PeerClient;
use crate::routes;
use crate::state::{AppState, SharedState, open_engine};

pub async fn run(
    args: NodeArgs,
    mut chain_cfg: ChainConfig,
    base: NodeConfig,
) -> Result<(), NodeError> {
    let node_cfg = NodeConfig {
        listen_addr: NodeConfig::for_port(args.port).listen_addr,
        ..base
    };
    if let Some(addr) = args.metrics_addr {
        chain_cfg.metrics.listen_addr = addr;
    }
    chain_cfg.metrics.enabled &= !args.no_metrics;

    // ---------------------------
    // Metrics
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new().map_err(|e| NodeError::Metrics(e.to_string()))?,
    );

    if chain_cfg.metrics.enabled {
        let metrics_clone = metrics.clone();
        let addr = chain_cfg.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = run_prometheus_http_server(metrics_clone, addr).await {
                error!(%addr, "metrics HTTP server error: {e}");
            }
        });
    }

    // ---------------------------
    // Storage + consensus engine
    // ---------------------------

    let engine = Arc::new(open_engine(&chain_cfg, metrics.clone())?);
    for name in ChainName::ALL {
        let chain = engine.chain(name);
        info!(chain = %name, height = ?chain.height(), tip = ?chain.tip_hash(), "loaded chain");
    }

    let peers = match &args.seed {
        Some(seed) => vec![PeerClient::new(seed, node_cfg.sync_timeout)?],
        None => Vec::new(),
    };

    for peer in &peers {
        for name in ChainName::ALL {
            sync_from(&engine, peer, name).await;
        }
    }

    let cancel = CancellationToken::new();
    let app_state: SharedState = Arc::new(AppState {
        engine,
        peers,
        metrics,
        cancel: cancel.clone(),
    });

    // ---------------------------
    // Miners, one per chain
    // ---------------------------

    let idle = chain_cfg.consensus.idle_interval();
    let miners: Vec<_> = ChainName::ALL
        .into_iter()
        .map(|name| tokio::spawn(run_miner(app_state.clone(), name, idle)))
        .collect();

    // ---------------------------
    // HTTP server
    // ---------------------------

    let listener = tokio::net::TcpListener::bind(node_cfg.listen_addr)
        .await
        .map_err(|source| NodeError::Bind {
            addr: node_cfg.listen_addr,
            source,
        })?;
    info!("node listening on http://{}", node_cfg.listen_addr);

    let shutdown = cancel.clone();
    axum::serve(listener, routes::router(app_state))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await
        .map_err(NodeError::Server)?;

    cancel.cancel();
    for miner in miners {
        if let Err(e) = miner.await {
            warn!("miner task ended abnormally: {e}");
        }
    }
    Ok(())
}

async fn sync_from(engine: &Arc<DefaultConsensusEngine>, peer: &PeerClient, name: ChainName) {
    let blocks = match peer.fetch_blocks(name).await {
        Ok(blocks) => blocks,
        Err(e) => {
            warn!(peer = peer.base_url(), chain = %name, "sync skipped: {e}");
            return;
        }
    };
    let engine = engine.clone();
    match tokio::task::spawn_blocking(move || sync_chain(&engine, name, blocks)).await {
        Ok(imported) => info!(peer = peer.base_url(), chain = %name, imported, "synced chain"),
        Err(e) => error!(chain = %name, "sync task failed: {e}"),
    }
}

/// Imports the blocks of a peer's chain (genesis first) that extend our
/// tip. A peer genesis we do not know replaces ours while nothing is built
/// on it yet. Stops at the first block that does not link, so a divergent
/// peer chain is never adopted. Returns the number of blocks appended.
pub fn sync_chain(engine: &DefaultConsensusEngine, name: ChainName, blocks: Vec<Block>) -> usize {
    let mut blocks = blocks.into_iter().peekable();
    if let Some(genesis) = blocks.next_if(Block::is_genesis) {
        let hash = genesis.hash;
        if let Err(e) = adopt_peer_genesis(engine, name, genesis) {
            warn!(chain = %name, %hash, error = %e, "peer genesis differs from ours; not adopting it");
            return 0;
        }
    }

    let mut imported = 0;
    for block in blocks {
        let hash = block.hash;
        match engine.import_block(name, block) {
            Ok(ImportOutcome::Appended(_)) => imported += 1,
            Ok(ImportOutcome::AlreadyKnown) => {}
            Err(ConsensusError::Chain(ChainError::ChainLinkageBroken { expected, found })) => {
                warn!(
                    chain = %name,
                    %hash,
                    ?expected,
                    ?found,
                    "peer chain diverges from ours; not adopting it"
                );
                break;
            }
            Err(e) => {
                warn!(chain = %name, %hash, error = %e, "peer block rejected during sync");
                break;
            }
        }
    }
    imported
}

fn adopt_peer_genesis(
    engine: &DefaultConsensusEngine,
    name: ChainName,
    genesis: Block,
) -> Result<(), ConsensusError> {
    if engine.chain(name).contains(&genesis.hash)? {
        return Ok(());
    }
    engine.adopt_genesis(name, genesis)?;
    Ok(())
}

/// Background miner for one chain.
///
/// Mines back to back while transactions are pending and sleeps for
/// `idle` otherwise. Every mined block is announced to all peers.
async fn run_miner(state: SharedState, name: ChainName, idle: Duration) {
    info!(chain = %name, idle_secs = idle.as_secs(), "miner running");
    loop {
        let engine = state.engine.clone();
        let cancel = state.cancel.clone();
        let mined = tokio::task::spawn_blocking(move || engine.mine_next(name, &cancel)).await;

        match mined {
            Ok(Ok(Some(block))) => {
                announce(&state.peers, name, &block).await;
                continue;
            }
            Ok(Ok(None)) => {}
            Ok(Err(ConsensusError::Cancelled)) => break,
            Ok(Err(e)) => error!(chain = %name, "mining failed: {e}"),
            Err(e) => {
                error!(chain = %name, "miner task panicked: {e}");
                break;
            }
        }

        tokio::select! {
            _ = state.cancel.cancelled() => break,
            _ = tokio::time::sleep(idle) => {}
        }
    }
    info!(chain = %name, "miner stopped");
}

async fn announce(peers: &[PeerClient], name: ChainName, block: &Block) {
    for peer in peers {
        match peer.announce_block(name, block).await {
            Ok(()) => debug!(peer = peer.base_url(), chain = %name, hash = %block.hash, "announced block"),
            Err(e) => warn!(peer = peer.base_url(), chain = %name, "announce failed: {e}"),
        }
    }
}

/// Waits for Ctrl-C and returns, used for graceful shutdown.
async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexchain::{
        Address, CreateToken, GenesisConfig, KeyPair, Signature, TokenInfo, Transaction, Transfer,
    };

    use crate::state::testing::{test_state, test_state_with};

    fn create(symbol: &str, owner: &KeyPair) -> Transaction {
        let mut tx = Transaction::CreateToken(CreateToken {
            token_info: TokenInfo {
                symbol: symbol.to_string(),
                supply: 10,
                decimals: 0,
            },
            owner_address: owner.address(),
            signature: Signature::default(),
        });
        owner.sign_transaction(&mut tx);
        tx
    }

    fn mine(state: &SharedState) {
        state
            .engine
            .mine_next(ChainName::Match, &CancellationToken::new())
            .expect("mine")
            .expect("block");
    }

    #[test]
    fn sync_imports_missing_blocks_once() {
        let (_a, source) = test_state();
        let (_b, sink) = test_state();
        let owner = KeyPair::generate();

        for symbol in ["FOO", "BAR"] {
            source.engine.submit(create(symbol, &owner), symbol).expect("submit");
            mine(&source);
        }
        let blocks = source
            .engine
            .chain(ChainName::Match)
            .blocks_from_genesis()
            .expect("blocks");

        assert_eq!(sync_chain(&sink.engine, ChainName::Match, blocks.clone()), 2);
        assert_eq!(sync_chain(&sink.engine, ChainName::Match, blocks), 0);
        assert_eq!(
            sink.engine.chain(ChainName::Match).tip_hash(),
            source.engine.chain(ChainName::Match).tip_hash()
        );
    }

    #[test]
    fn divergent_peer_chain_is_not_adopted() {
        let (_a, source) = test_state();
        let (_b, sink) = test_state();
        let owner = KeyPair::generate();

        source.engine.submit(create("FOO", &owner), "FOO").expect("submit");
        mine(&source);
        sink.engine.submit(create("BAR", &owner), "BAR").expect("submit");
        mine(&sink);
        let ours = sink.engine.chain(ChainName::Match).tip_hash();

        let theirs = source
            .engine
            .chain(ChainName::Match)
            .blocks_from_genesis()
            .expect("blocks");
        assert_eq!(sync_chain(&sink.engine, ChainName::Match, theirs), 0);
        assert_eq!(sink.engine.chain(ChainName::Match).tip_hash(), ours);
    }

    fn rewarded_to(owner: &KeyPair) -> GenesisConfig {
        GenesisConfig {
            reward_address: owner.address().to_string(),
            ..GenesisConfig::default()
        }
    }

    fn spend_reward(state: &SharedState, owner: &KeyPair, amount: u64) {
        let mut tx = Transaction::Transfer(Transfer {
            id: 1,
            symbol: "NATIVE".to_string(),
            amount,
            from_address: owner.address(),
            to_address: Address::from("b"),
            signature: Signature::default(),
        });
        owner.sign_transaction(&mut tx);
        state.engine.submit(tx, "NATIVE").expect("submit");
        state
            .engine
            .mine_next(ChainName::Native, &CancellationToken::new())
            .expect("mine")
            .expect("block");
    }

    #[test]
    fn fresh_node_adopts_seed_genesis_with_other_reward_address() {
        let alice = KeyPair::generate();
        let (_a, source) = test_state_with(rewarded_to(&alice));
        let (_b, sink) = test_state();
        spend_reward(&source, &alice, 4);

        let theirs = source
            .engine
            .chain(ChainName::Native)
            .blocks_from_genesis()
            .expect("blocks");
        assert_ne!(
            sink.engine.chain(ChainName::Native).tip_hash(),
            Some(theirs[0].hash)
        );

        assert_eq!(sync_chain(&sink.engine, ChainName::Native, theirs), 1);
        assert_eq!(
            sink.engine.chain(ChainName::Native).tip(),
            source.engine.chain(ChainName::Native).tip()
        );
        let state = sink.engine.state(ChainName::Native).expect("state");
        assert_eq!(state.balance(&alice.address(), "NATIVE"), 6);
        assert_eq!(state.balance(&Address::from("b"), "NATIVE"), 4);
        assert_eq!(state.balance(&Address::from("genesis"), "NATIVE"), 0);
        assert_eq!(
            state.accounted_supply("NATIVE"),
            source
                .engine
                .state(ChainName::Native)
                .expect("source")
                .accounted_supply("NATIVE")
        );
    }

    #[test]
    fn genesis_with_blocks_on_it_is_kept() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let (_a, source) = test_state_with(rewarded_to(&alice));
        let (_b, sink) = test_state_with(rewarded_to(&bob));
        spend_reward(&source, &alice, 4);
        spend_reward(&sink, &bob, 3);
        let ours = sink.engine.chain(ChainName::Native).tip();

        let theirs = source
            .engine
            .chain(ChainName::Native)
            .blocks_from_genesis()
            .expect("blocks");
        assert_eq!(sync_chain(&sink.engine, ChainName::Native, theirs), 0);
        assert_eq!(sink.engine.chain(ChainName::Native).tip(), ours);
        let state = sink.engine.state(ChainName::Native).expect("state");
        assert_eq!(state.balance(&bob.address(), "NATIVE"), 7);
    }
}
