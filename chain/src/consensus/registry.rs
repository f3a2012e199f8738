//! Registry of the node's ledgers.
//!
//! [`Blockchains`] owns one [`Blockchain`] per [`ChainName`], all backed by
//! the same [`ChainStore`]. It is created once per process and creates the
//! genesis blocks only when the store holds none.

use std::sync::Arc;

use tracing::info;

use super::blockchain::Blockchain;
use super::config::ConsensusConfig;
use super::error::ChainError;
use super::pow::ProofOfWork;
use super::store::{ChainStore, ChainTip};
use crate::config::GenesisConfig;
use crate::types::{
    Address, Block, COINBASE_ADDRESS, ChainName, CreateToken, Signature, TokenInfo, Transaction,
    Transfer,
};

/// The ledgers of one node.
pub struct Blockchains<S> {
    store: Arc<S>,
    native: Blockchain<S>,
    matching: Blockchain<S>,
}

impl<S> Blockchains<S>
where
    S: ChainStore,
{
    /// Loads both chains from `store`, sealing and appending a genesis
    /// block for any chain that has none yet.
    pub fn create_or_load(
        store: Arc<S>,
        consensus: &ConsensusConfig,
        genesis: &GenesisConfig,
    ) -> Result<Self, ChainError> {
        let pow = ProofOfWork::new(consensus.difficulty_bits);
        let native = Blockchain::open(ChainName::Native, store.clone(), pow)?;
        let matching = Blockchain::open(ChainName::Match, store.clone(), pow)?;

        for chain in [&native, &matching] {
            if chain.tip().is_none() {
                let block = genesis_block(chain.name(), genesis, pow)?;
                info!(chain = %chain.name(), hash = %block.hash, "created genesis block");
                chain.add_block(block)?;
            }
        }

        Ok(Self {
            store,
            native,
            matching,
        })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn chain(&self, name: ChainName) -> &Blockchain<S> {
        match name {
            ChainName::Native => &self.native,
            ChainName::Match => &self.matching,
        }
    }

    /// Looks a chain up by its wire name; anything other than
    /// `NATIVE_CHAIN` / `MATCH_CHAIN` is [`ChainError::UnknownChain`].
    pub fn get_chain(&self, name: &str) -> Result<&Blockchain<S>, ChainError> {
        let name: ChainName = name
            .parse()
            .map_err(|_| ChainError::UnknownChain(name.to_string()))?;
        Ok(self.chain(name))
    }

    /// Delegates to the named chain's [`Blockchain::add_block`].
    pub fn add_block(&self, name: &str, block: Block) -> Result<ChainTip, ChainError> {
        self.get_chain(name)?.add_block(block)
    }
}

/// Seed payload of each chain: the native mint plus the genesis reward on
/// `NATIVE_CHAIN`, nothing on `MATCH_CHAIN`.
pub fn genesis_payload(name: ChainName, genesis: &GenesisConfig) -> Vec<Transaction> {
    match name {
        ChainName::Native => {
            let coinbase = Address::from(COINBASE_ADDRESS);
            vec![
                Transaction::CreateToken(CreateToken {
                    token_info: TokenInfo {
                        symbol: genesis.native_symbol.clone(),
                        supply: genesis.native_supply,
                        decimals: genesis.native_decimals,
                    },
                    owner_address: coinbase.clone(),
                    signature: Signature::default(),
                }),
                Transaction::Transfer(Transfer {
                    id: 0,
                    symbol: genesis.native_symbol.clone(),
                    amount: genesis.reward,
                    from_address: coinbase,
                    to_address: Address::from(genesis.reward_address.as_str()),
                    signature: Signature::default(),
                }),
            ]
        }
        ChainName::Match => Vec::new(),
    }
}

fn genesis_block(
    name: ChainName,
    genesis: &GenesisConfig,
    pow: ProofOfWork,
) -> Result<Block, ChainError> {
    pow.seal(None, genesis_payload(name, genesis), genesis.timestamp, || false)
        .ok_or(ChainError::GenesisSealFailed(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryChainStore;

    fn consensus() -> ConsensusConfig {
        ConsensusConfig {
            difficulty_bits: 4,
            ..ConsensusConfig::default()
        }
    }

    #[test]
    fn create_initialises_both_genesis_blocks() {
        let store = Arc::new(InMemoryChainStore::new());
        let registry = Blockchains::create_or_load(store, &consensus(), &GenesisConfig::default())
            .expect("create");

        for name in ChainName::ALL {
            let chain = registry.chain(name);
            assert_eq!(chain.height(), Some(0));
            let genesis = chain.iter().next().expect("genesis").expect("block");
            assert!(genesis.is_genesis());
        }

        let native = registry.chain(ChainName::Native).iter().next();
        let native = native.expect("genesis").expect("block");
        assert_eq!(native.data.len(), 2);
    }

    #[test]
    fn load_does_not_recreate_genesis() {
        let store = Arc::new(InMemoryChainStore::new());
        let cfg = GenesisConfig::default();
        let first = Blockchains::create_or_load(store.clone(), &consensus(), &cfg).expect("create");
        let tip = first.chain(ChainName::Match).tip_hash();

        let other_cfg = GenesisConfig {
            reward_address: "someone-else".to_string(),
            ..GenesisConfig::default()
        };
        let second = Blockchains::create_or_load(store.clone(), &consensus(), &other_cfg)
            .expect("load");

        assert_eq!(second.chain(ChainName::Match).tip_hash(), tip);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn genesis_is_deterministic_for_same_config() {
        let cfg = GenesisConfig::default();
        let a = Blockchains::create_or_load(
            Arc::new(InMemoryChainStore::new()),
            &consensus(),
            &cfg,
        )
        .expect("a");
        let b = Blockchains::create_or_load(
            Arc::new(InMemoryChainStore::new()),
            &consensus(),
            &cfg,
        )
        .expect("b");

        assert_eq!(
            a.chain(ChainName::Native).tip_hash(),
            b.chain(ChainName::Native).tip_hash()
        );
    }

    #[test]
    fn unknown_chain_name_is_rejected() {
        let registry = Blockchains::create_or_load(
            Arc::new(InMemoryChainStore::new()),
            &consensus(),
            &GenesisConfig::default(),
        )
        .expect("create");

        assert!(registry.get_chain("MATCH_CHAIN").is_ok());
        match registry.get_chain("FOO_CHAIN") {
            Err(ChainError::UnknownChain(name)) => assert_eq!(name, "FOO_CHAIN"),
            other => panic!("unexpected result: {:?}", other.map(|c| c.name())),
        }
    }
}
