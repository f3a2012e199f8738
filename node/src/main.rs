//! Node binary.
//!
//! One binary serves as wallet tool, chain inspector, client and full
//! node over the `dexchain` crate:
//!
//! - `createwallet`, `printaddresses` manage the local wallet file,
//! - `createbc`, `printchain` work on the local RocksDB database,
//! - `transfer`, `order`, `cancel`, `claim`, `createtoken` sign a
//!   transaction and submit it to a seed node,
//! - `node` runs the HTTP RPC, syncs from a seed and mines both chains.

mod cli;
mod commands;
mod config;
mod error;
mod node;
mod peers;
mod routes;
mod state;

use clap::Parser;

use dexchain::{Address, ChainConfig};

use cli::{Cli, Command};
use commands::ClientRequest;
use config::NodeConfig;
use error::NodeError;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "dexnode=info,dexchain=info".to_string()),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), NodeError> {
    let mut chain_cfg = ChainConfig::default();
    chain_cfg.storage.path = cli.db.to_string_lossy().to_string();
    if let Some(bits) = cli.difficulty {
        chain_cfg.consensus.difficulty_bits = bits;
    }
    let node_cfg = NodeConfig {
        seeds_path: cli.seeds.clone(),
        wallet_path: cli.wallet.clone(),
        ..NodeConfig::default()
    };

    let request = match cli.command {
        Command::CreateWallet => return commands::create_wallet(&node_cfg.wallet_path),
        Command::PrintAddresses => return commands::print_addresses(&node_cfg.wallet_path),
        Command::CreateBlockchain { address } => {
            return commands::create_blockchain(&chain_cfg, &address);
        }
        Command::PrintChain => return commands::print_chain(&chain_cfg),
        Command::Node(args) => return node::run(args, chain_cfg, node_cfg).await,
        Command::Transfer {
            from,
            to,
            symbol,
            amount,
        } => ClientRequest::Transfer {
            from: Address::from(from),
            to: Address::from(to),
            symbol,
            amount,
        },
        Command::Order {
            address,
            sell_symbol,
            sell_amount,
            buy_symbol,
            buy_amount,
        } => ClientRequest::Order {
            seller: Address::from(address),
            sell_symbol,
            sell_amount,
            buy_symbol,
            buy_amount,
        },
        Command::Cancel {
            address,
            symbol,
            order_id,
        } => ClientRequest::Cancel {
            seller: Address::from(address),
            symbol,
            order_id,
        },
        Command::Claim {
            address,
            symbol,
            amount,
        } => ClientRequest::Claim {
            address: Address::from(address),
            symbol,
            amount,
        },
        Command::CreateToken {
            address,
            symbol,
            supply,
            decimals,
        } => ClientRequest::CreateToken {
            owner: Address::from(address),
            symbol,
            supply,
            decimals,
        },
    };
    commands::send(&node_cfg, request).await
}
