//! Command-line arguments.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "dexnode",
    version,
    about = "Dual-ledger proof-of-work node with an on-chain exchange"
)]
pub struct Cli {
    /// RocksDB directory holding both ledgers
    #[arg(long, global = true, value_name = "PATH", default_value = "blockchain.db")]
    pub db: PathBuf,

    /// Wallet file (JSON map of address to secret key)
    #[arg(long, global = true, value_name = "FILE", default_value = "wallet.json")]
    pub wallet: PathBuf,

    /// Seeds file used by client commands, one host:port per line
    #[arg(long, global = true, value_name = "FILE", default_value = "seeds.txt")]
    pub seeds: PathBuf,

    /// Leading zero bits required of every block hash
    #[arg(long, global = true, value_name = "BITS")]
    pub difficulty: Option<u32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Creates a wallet with a new key pair
    #[command(name = "createwallet")]
    CreateWallet,
    /// Creates both ledgers; ADDRESS gets the genesis reward
    #[command(name = "createbc")]
    CreateBlockchain {
        #[arg(long)]
        address: String,
    },
    /// Prints every block of both ledgers, tip first
    #[command(name = "printchain")]
    PrintChain,
    /// Lists the addresses in the wallet file
    #[command(name = "printaddresses")]
    PrintAddresses,
    /// Starts a full node
    Node(NodeArgs),
    /// Sends a signed transfer
    Transfer {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        amount: u64,
    },
    /// Places a signed limit order
    Order {
        /// Seller address; must be in the wallet
        #[arg(long)]
        address: String,
        #[arg(long)]
        sell_symbol: String,
        #[arg(long)]
        sell_amount: u64,
        #[arg(long)]
        buy_symbol: String,
        #[arg(long)]
        buy_amount: u64,
    },
    /// Cancels a resting order
    Cancel {
        /// Seller of the order; must be in the wallet
        #[arg(long)]
        address: String,
        /// Sell symbol of the order
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        order_id: u64,
    },
    /// Moves an owed balance into the spendable balance
    Claim {
        #[arg(long)]
        address: String,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        amount: u64,
    },
    /// Registers a token and mints its supply to ADDRESS
    #[command(name = "createtoken")]
    CreateToken {
        #[arg(long)]
        address: String,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        supply: u64,
        #[arg(long, default_value_t = 0)]
        decimals: u8,
    },
}

#[derive(Args, Debug)]
pub struct NodeArgs {
    /// Port for the HTTP RPC
    pub port: u16,
    /// Peer to sync from and announce blocks to (host:port)
    pub seed: Option<String>,
    /// Bind address of the Prometheus exporter
    #[arg(long, value_name = "ADDR")]
    pub metrics_addr: Option<SocketAddr>,
    /// Do not run the Prometheus exporter
    #[arg(long)]
    pub no_metrics: bool,
}
