//! High-level consensus engine orchestration.
//!
//! The consensus engine wires together:
//!
//! - the [`Blockchains`] registry for persistence,
//! - a [`BlockValidator`] for block-local checks on peer blocks,
//! - one [`PendingPool`] and one cached [`ConsensusState`] per chain, and
//! - a [`Miner`] for block assembly.
//!
//! It exposes transaction admission, local mining and import of peer
//! blocks. Every path that appends a block goes through the chain's
//! atomic tip check, so the two can race safely.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::blockchain::Blockchain;
use super::config::ConsensusConfig;
use super::error::{ChainError, ConsensusError};
use super::miner::Miner;
use super::pool::{PendingPool, TxPool};
use super::registry::Blockchains;
use super::store::{ChainStore, ChainTip};
use super::validator::BlockValidator;
use crate::metrics::MetricsRegistry;
use crate::state::{ConsensusState, SignaturePolicy, TxError};
use crate::types::{Block, ChainName, Transaction, TxHash};

/// Result of handing a peer block to [`ConsensusEngine::import_block`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImportOutcome {
    Appended(ChainTip),
    /// The block is already part of the chain.
    AlreadyKnown,
}

#[derive(Default)]
struct Lane {
    pool: PendingPool,
    /// State at the tip it records; rebuilt when the tip moved.
    state: Option<ConsensusState>,
}

/// Fully-configurable consensus engine.
///
/// This struct is generic over:
///
/// - `S`: storage backend implementing [`ChainStore`],
/// - `V`: block validator implementing [`BlockValidator`].
pub struct ConsensusEngine<S, V> {
    pub config: ConsensusConfig,
    native_symbol: String,
    chains: Blockchains<S>,
    validator: V,
    miner: Miner,
    native: Mutex<Lane>,
    matching: Mutex<Lane>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl<S, V> ConsensusEngine<S, V>
where
    S: ChainStore,
    V: BlockValidator,
{
    /// Creates a new consensus engine.
    ///
    /// `native_symbol` routes submissions: that symbol goes to
    /// `NATIVE_CHAIN`, every other one to `MATCH_CHAIN`.
    pub fn new(
        config: ConsensusConfig,
        chains: Blockchains<S>,
        validator: V,
        native_symbol: impl Into<String>,
    ) -> Self {
        let miner = Miner::from_config(&config);
        Self {
            config,
            native_symbol: native_symbol.into(),
            chains,
            validator,
            miner,
            native: Mutex::default(),
            matching: Mutex::default(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn chains(&self) -> &Blockchains<S> {
        &self.chains
    }

    pub fn chain(&self, name: ChainName) -> &Blockchain<S> {
        self.chains.chain(name)
    }

    /// Chain that records submissions for `target_symbol`.
    pub fn route(&self, target_symbol: &str) -> ChainName {
        ChainName::for_target(target_symbol, &self.native_symbol)
    }

    fn lane(&self, name: ChainName) -> MutexGuard<'_, Lane> {
        let lane = match name {
            ChainName::Native => &self.native,
            ChainName::Match => &self.matching,
        };
        lane.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn replay(&self, chain: &Blockchain<S>) -> Result<ConsensusState, ConsensusError> {
        let start = Instant::now();
        let state = ConsensusState::replay(chain)?;
        let elapsed = start.elapsed();
        if let Some(m) = &self.metrics {
            m.consensus.replay_seconds.observe(elapsed.as_secs_f64());
        }
        debug!(chain = %chain.name(), ?elapsed, height = ?state.height(), "replayed chain");
        Ok(state)
    }

    // Returns the lane's state, replaying the chain if the cached one is
    // not at the current tip.
    fn fresh_state<'a>(
        &self,
        lane: &'a mut Lane,
        name: ChainName,
    ) -> Result<&'a mut ConsensusState, ConsensusError> {
        let chain = self.chain(name);
        let tip = chain.tip_hash();
        let state = match lane.state.take() {
            Some(state) if state.tip() == tip => state,
            _ => self.replay(chain)?,
        };
        Ok(lane.state.insert(state))
    }

    /// Runs `f` against the state at the tip of `name`.
    pub fn with_state<R>(
        &self,
        name: ChainName,
        f: impl FnOnce(&ConsensusState) -> R,
    ) -> Result<R, ConsensusError> {
        let mut lane = self.lane(name);
        let state = self.fresh_state(&mut lane, name)?;
        Ok(f(state))
    }

    /// Copy of the state at the tip of `name`.
    pub fn state(&self, name: ChainName) -> Result<ConsensusState, ConsensusError> {
        self.with_state(name, ConsensusState::clone)
    }

    pub fn pending(&self, name: ChainName) -> Vec<Transaction> {
        self.lane(name).pool.iter().cloned().collect()
    }

    /// Validates a user transaction against the tip state of the chain
    /// `target_symbol` routes to and queues it for mining.
    pub fn submit(
        &self,
        tx: Transaction,
        target_symbol: &str,
    ) -> Result<ChainName, ConsensusError> {
        let name = self.route(target_symbol);
        let mut lane = self.lane(name);
        let result = self.admit(&mut lane, name, tx);
        let label = [name.as_str()];
        if let Some(m) = &self.metrics {
            match &result {
                Ok(()) => m.consensus.txs_admitted.with_label_values(&label).inc(),
                Err(_) => m.consensus.txs_rejected.with_label_values(&label).inc(),
            }
            m.consensus
                .pending_txs
                .with_label_values(&label)
                .set(lane.pool.len() as i64);
        }
        result.map(|()| name)
    }

    fn admit(
        &self,
        lane: &mut Lane,
        name: ChainName,
        tx: Transaction,
    ) -> Result<(), ConsensusError> {
        let hash = tx.tx_hash();
        let reject = |source: TxError| ConsensusError::Transaction {
            chain: name,
            source,
        };
        if lane.pool.contains(&hash) {
            return Err(reject(TxError::DuplicateTransaction(hash)));
        }
        self.fresh_state(lane, name)?
            .validate(&tx, SignaturePolicy::Verify)
            .map_err(reject)?;

        debug!(chain = %name, kind = tx.kind(), %hash, "admitted transaction");
        lane.pool.insert(tx);
        Ok(())
    }

    /// Mines one block on `name` from its pending pool.
    ///
    /// Returns `Ok(None)` when there is nothing to mine. If another block
    /// lands on the chain while searching, the round restarts on the new
    /// tip with re-validated transactions. Fails with
    /// [`ConsensusError::Cancelled`] once `cancel` fires.
    pub fn mine_next(
        &self,
        name: ChainName,
        cancel: &CancellationToken,
    ) -> Result<Option<Block>, ConsensusError> {
        let chain = self.chain(name);
        loop {
            if cancel.is_cancelled() {
                return Err(ConsensusError::Cancelled);
            }

            let tip = chain.tip_hash();
            let (base, assembly) = {
                let mut lane = self.lane(name);
                let base = self.fresh_state(&mut lane, name)?.clone();
                let assembly = self.miner.assemble(&base, &lane.pool);
                let evicted: HashSet<TxHash> = assembly.evicted.iter().map(|(h, _)| *h).collect();
                lane.pool.remove(&evicted);
                (base, assembly)
            };
            if !self.miner.should_seal(&assembly) {
                return Ok(None);
            }

            let start = Instant::now();
            let sealed = chain.pow().seal(tip, assembly.txs, unix_now(), || {
                cancel.is_cancelled() || chain.tip_hash() != tip
            });
            if let Some(m) = &self.metrics {
                m.consensus
                    .pow_seal_seconds
                    .observe(start.elapsed().as_secs_f64());
            }

            let Some(block) = sealed else {
                if cancel.is_cancelled() {
                    return Err(ConsensusError::Cancelled);
                }
                self.count_stale(name);
                debug!(chain = %name, "tip moved while sealing, restarting");
                continue;
            };

            let mut next = base;
            next.apply_block(&block, SignaturePolicy::Trust)
                .map_err(|(index, source)| ConsensusError::InvalidBlockTransaction {
                    hash: block.hash,
                    index,
                    source,
                })?;

            match self.commit(name, block.clone(), next) {
                Ok(tip) => {
                    info!(chain = %name, height = tip.height, hash = %tip.hash, "mined block");
                    return Ok(Some(block));
                }
                Err(ConsensusError::Chain(ChainError::StaleTip { .. })) => {
                    self.count_stale(name);
                    debug!(chain = %name, "lost race for tip, restarting");
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn count_stale(&self, name: ChainName) {
        if let Some(m) = &self.metrics {
            m.consensus.stale_tips.with_label_values(&[name.as_str()]).inc();
        }
    }

    /// Validates a block received from a peer and appends it to `name`.
    ///
    /// The block must build on the current tip
    /// ([`ChainError::ChainLinkageBroken`] otherwise) and every
    /// transaction, signatures included, must apply to the tip state
    /// ([`ConsensusError::InvalidBlockTransaction`] otherwise). Rejected
    /// blocks change nothing.
    pub fn import_block(
        &self,
        name: ChainName,
        block: Block,
    ) -> Result<ImportOutcome, ConsensusError> {
        let result = self.try_import(name, block);
        if let (Err(e), Some(m)) = (&result, &self.metrics) {
            if !matches!(e, ConsensusError::Chain(ChainError::StaleTip { .. })) {
                m.consensus
                    .blocks_rejected
                    .with_label_values(&[name.as_str()])
                    .inc();
            }
        }
        result
    }

    fn try_import(&self, name: ChainName, block: Block) -> Result<ImportOutcome, ConsensusError> {
        self.validator.validate(&block)?;

        let chain = self.chain(name);
        if chain.contains(&block.hash)? {
            return Ok(ImportOutcome::AlreadyKnown);
        }
        let tip = chain.tip_hash();
        if block.header.prev_block_hash != tip {
            return Err(ChainError::ChainLinkageBroken {
                expected: tip,
                found: block.header.prev_block_hash,
            }
            .into());
        }

        let mut next = self.state(name)?;
        next.apply_block(&block, SignaturePolicy::Verify)
            .map_err(|(index, source)| {
                warn!(chain = %name, hash = %block.hash, index, error = %source, "peer block rejected");
                ConsensusError::InvalidBlockTransaction {
                    hash: block.hash,
                    index,
                    source,
                }
            })?;

        let tip = self.commit(name, block, next)?;
        info!(chain = %name, height = tip.height, hash = %tip.hash, "imported block");
        Ok(ImportOutcome::Appended(tip))
    }

    /// Replaces the genesis of `name` with a peer's while nothing has been
    /// built on ours, so a fresh node can join a network whose genesis was
    /// created with other settings.
    ///
    /// Genesis transactions are unsigned system transactions, so they are
    /// replayed without signature checks. Pending transactions are
    /// re-checked against the new state when the next block is assembled.
    pub fn adopt_genesis(&self, name: ChainName, genesis: Block) -> Result<ChainTip, ConsensusError> {
        self.validator.validate(&genesis)?;
        let mut next = ConsensusState::new();
        next.apply_block(&genesis, SignaturePolicy::Trust)
            .map_err(|(index, source)| ConsensusError::InvalidBlockTransaction {
                hash: genesis.hash,
                index,
                source,
            })?;

        let mut lane = self.lane(name);
        let tip = self.chain(name).replace_genesis(genesis)?;
        lane.state = Some(next);
        info!(chain = %name, hash = %tip.hash, "adopted peer genesis");
        Ok(tip)
    }

    // Appends `block`, caches `next` as the new tip state, drops the
    // recorded transactions from the pool and queues claims for any
    // owed balance.
    fn commit(
        &self,
        name: ChainName,
        block: Block,
        next: ConsensusState,
    ) -> Result<ChainTip, ConsensusError> {
        let included: HashSet<TxHash> = block.data.iter().map(Transaction::tx_hash).collect();
        let tip = self.chain(name).add_block(block)?;

        let mut lane = self.lane(name);
        lane.pool.remove(&included);
        let claims = next.pending_claims(rand::random::<u64>);
        lane.state = Some(next);
        self.queue_claims(&mut lane, name, claims);

        if let Some(m) = &self.metrics {
            let label = [name.as_str()];
            m.consensus.blocks_appended.with_label_values(&label).inc();
            m.consensus
                .pending_txs
                .with_label_values(&label)
                .set(lane.pool.len() as i64);
        }
        Ok(tip)
    }

    // Skips owed balances that already have a claim waiting; a later
    // block issues a claim for whatever is still owed after it lands.
    fn queue_claims(&self, lane: &mut Lane, name: ChainName, claims: Vec<Transaction>) {
        let pending: HashSet<(String, String)> = lane
            .pool
            .iter()
            .filter_map(|tx| match tx {
                Transaction::ClaimFunds(c) => Some((c.address.0.clone(), c.symbol.clone())),
                _ => None,
            })
            .collect();

        for claim in claims {
            let Transaction::ClaimFunds(c) = &claim else {
                continue;
            };
            if pending.contains(&(c.address.0.clone(), c.symbol.clone())) {
                continue;
            }
            debug!(chain = %name, address = %c.address, symbol = %c.symbol, amount = c.amount, "queued claim");
            lane.pool.insert(claim);
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
