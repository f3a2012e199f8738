//! Node binary configuration.
//!
//! Chain-level settings (consensus, storage, genesis, metrics) live in
//! `dexchain::ChainConfig`; this covers what only the binary needs.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the HTTP server, peers and local files.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Address to bind the RPC server to.
    pub listen_addr: SocketAddr,
    /// File listing seed nodes, one `host:port` per line.
    pub seeds_path: PathBuf,
    /// JSON wallet file.
    pub wallet_path: PathBuf,
    /// Timeout for every request made to a peer.
    pub sync_timeout: Duration,
}

impl NodeConfig {
    /// Listens on all interfaces at `port`.
    pub fn for_port(port: u16) -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            ..Self::default()
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            seeds_path: PathBuf::from("seeds.txt"),
            wallet_path: PathBuf::from("wallet.json"),
            sync_timeout: Duration::from_secs(5),
        }
    }
}
