use std::io;

use thiserror::Error;

use dexchain::{ChainError, StorageError, WalletError};

use crate::peers::PeerError;

/// Top-level error of a CLI command; printed to stderr before exiting
/// with status 1.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("failed to open block store: {0}")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error(transparent)]
    Peer(#[from] PeerError),
    #[error("failed to initialise metrics registry: {0}")]
    Metrics(String),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("server error: {0}")]
    Server(#[source] io::Error),
    #[error("failed to write output: {0}")]
    Stdout(#[source] io::Error),
    #[error("node rejected transaction: {0}")]
    Rejected(String),
}
