//! Offline and client subcommands.
//!
//! Offline commands work on the local database and wallet file directly.
//! Client commands build a transaction, sign it with a wallet key and
//! submit it to the first reachable seed.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use rand::random;
use tracing::info;

use dexchain::{
    Address, Blockchain, Blockchains, CancelOrder, ChainConfig, ChainName, ChainStore,
    ClaimFunds, CreateToken, Order, ProofOfWork, RocksDbChainStore, Signature, TokenInfo,
    Transaction, Transfer, WalletStore,
};

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::peers::{PeerClient, read_seeds};

pub fn create_wallet(wallet_path: &Path) -> Result<(), NodeError> {
    let mut wallet = WalletStore::load(wallet_path)?;
    let address = wallet.create_wallet()?;
    println!("New wallet's address: {address}");
    Ok(())
}

pub fn print_addresses(wallet_path: &Path) -> Result<(), NodeError> {
    let wallet = WalletStore::load(wallet_path)?;
    for address in wallet.addresses() {
        println!("{address}");
    }
    Ok(())
}

/// Creates both genesis blocks with the reward going to `address`. An
/// existing database is left as it is.
pub fn create_blockchain(cfg: &ChainConfig, address: &str) -> Result<(), NodeError> {
    let mut cfg = cfg.clone();
    cfg.genesis.reward_address = address.to_string();

    let store = Arc::new(RocksDbChainStore::open(&cfg.storage)?);
    let pow = ProofOfWork::new(cfg.consensus.difficulty_bits);
    if Blockchain::open(ChainName::Native, store.clone(), pow)?.tip().is_some() {
        println!("Blockchain already exists at {}", cfg.storage.path);
        return Ok(());
    }

    let chains = Blockchains::create_or_load(store, &cfg.consensus, &cfg.genesis)?;
    for name in ChainName::ALL {
        info!(chain = %name, tip = ?chains.chain(name).tip_hash(), "genesis ready");
    }
    println!("Done!");
    Ok(())
}

/// Prints `MATCH_CHAIN` then `NATIVE_CHAIN`, each from tip to genesis.
pub fn print_chain(cfg: &ChainConfig) -> Result<(), NodeError> {
    let store = Arc::new(RocksDbChainStore::open(&cfg.storage)?);
    let pow = ProofOfWork::new(cfg.consensus.difficulty_bits);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for name in [ChainName::Match, ChainName::Native] {
        let chain = Blockchain::open(name, store.clone(), pow)?;
        write_chain(&mut out, &chain).map_err(NodeError::Stdout)?;
    }
    Ok(())
}

fn write_chain<S, W>(out: &mut W, chain: &Blockchain<S>) -> io::Result<()>
where
    S: ChainStore,
    W: Write,
{
    writeln!(out, "{}", chain.name())?;
    match chain.height() {
        Some(height) => writeln!(out, "Height: {height}")?,
        None => writeln!(out, "Height: (empty)")?,
    }
    for block in chain.iter() {
        let block = block.map_err(io::Error::other)?;
        let data = serde_json::to_string(&block.data).map_err(io::Error::other)?;
        writeln!(out, "Prev Hash: {}", hex::encode(block.prev_hash_bytes()))?;
        writeln!(out, "Data: {data}")?;
        writeln!(out, "Hash: {}", block.hash)?;
        writeln!(out, "Validated Proof of Work: {}", chain.pow().validate(&block))?;
        writeln!(out, "-------------------------------")?;
    }
    Ok(())
}

/// Transactions a client command can send.
#[derive(Debug)]
pub enum ClientRequest {
    Transfer {
        from: Address,
        to: Address,
        symbol: String,
        amount: u64,
    },
    Order {
        seller: Address,
        sell_symbol: String,
        sell_amount: u64,
        buy_symbol: String,
        buy_amount: u64,
    },
    Cancel {
        seller: Address,
        symbol: String,
        order_id: u64,
    },
    Claim {
        address: Address,
        symbol: String,
        amount: u64,
    },
    CreateToken {
        owner: Address,
        symbol: String,
        supply: u64,
        decimals: u8,
    },
}

impl ClientRequest {
    /// Builds the transaction and the target symbol it is routed by. Ids
    /// are random; `None` for kinds that carry none.
    fn build(self) -> (Transaction, String, Option<Address>, Option<u64>) {
        match self {
            ClientRequest::Transfer {
                from,
                to,
                symbol,
                amount,
            } => {
                let id = random::<u64>();
                let tx = Transaction::Transfer(Transfer {
                    id,
                    symbol: symbol.clone(),
                    amount,
                    from_address: from.clone(),
                    to_address: to,
                    signature: Signature::default(),
                });
                (tx, symbol, Some(from), Some(id))
            }
            ClientRequest::Order {
                seller,
                sell_symbol,
                sell_amount,
                buy_symbol,
                buy_amount,
            } => {
                let id = random::<u64>();
                let tx = Transaction::Order(Order {
                    id,
                    sell_symbol: sell_symbol.clone(),
                    buy_symbol,
                    sell_amount,
                    buy_amount,
                    seller_address: seller.clone(),
                    signature: Signature::default(),
                });
                (tx, sell_symbol, Some(seller), Some(id))
            }
            ClientRequest::Cancel {
                seller,
                symbol,
                order_id,
            } => {
                let tx = Transaction::CancelOrder(CancelOrder {
                    symbol: symbol.clone(),
                    order_id,
                    signature: Signature::default(),
                });
                (tx, symbol, Some(seller), None)
            }
            ClientRequest::Claim {
                address,
                symbol,
                amount,
            } => {
                let id = random::<u64>();
                let tx = Transaction::ClaimFunds(ClaimFunds {
                    id,
                    symbol: symbol.clone(),
                    address,
                    amount,
                });
                (tx, symbol, None, Some(id))
            }
            ClientRequest::CreateToken {
                owner,
                symbol,
                supply,
                decimals,
            } => {
                let tx = Transaction::CreateToken(CreateToken {
                    token_info: TokenInfo {
                        symbol,
                        supply,
                        decimals,
                    },
                    owner_address: owner.clone(),
                    signature: Signature::default(),
                });
                (tx, ChainName::Match.as_str().to_string(), Some(owner), None)
            }
        }
    }
}

/// Signs `request` with the wallet key of its signer and sends it to the
/// first seed that answers.
pub async fn send(node_cfg: &NodeConfig, request: ClientRequest) -> Result<(), NodeError> {
    let (mut tx, target_symbol, signer, id) = request.build();
    if let Some(signer) = &signer {
        WalletStore::load(&node_cfg.wallet_path)?.sign(signer, &mut tx)?;
    }

    let seeds = read_seeds(&node_cfg.seeds_path)?;
    let peer = PeerClient::connect_first(&seeds, node_cfg.sync_timeout).await?;

    info!(kind = tx.kind(), target = %target_symbol, "sending transaction");
    let response = peer.send_tx(tx, &target_symbol).await?;
    if !response.accepted {
        return Err(NodeError::Rejected(
            response.error.unwrap_or_else(|| "no reason given".to_string()),
        ));
    }

    match (response.chain, id) {
        (Some(chain), Some(id)) => println!("Transaction sent to {chain}, transaction id: {id}"),
        (Some(chain), None) => println!("Transaction sent to {chain}"),
        _ => println!("Transaction sent"),
    }
    Ok(())
}
