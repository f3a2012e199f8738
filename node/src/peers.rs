//! Seed file and HTTP client for talking to other nodes.
//!
//! A peer is addressed as `host:port` and exposes the RPC served by
//! [`crate::routes`]. The client is thread-safe and cheap to clone.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, info};

use dexchain::{Block, ChainName, Transaction};

use crate::routes::tx::{TxRequest, TxResponse};

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("couldn't read seeds file {path}: {source}. Run \"echo NODE_IP:NODE_PORT > {path}\" and try again")]
    SeedsFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("seeds file {0} lists no peers")]
    NoSeeds(PathBuf),
    #[error("no provided seed is online")]
    NoneOnline,
    #[error("HTTP {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP status {status}")]
    Status { url: String, status: StatusCode },
}

/// Reads `host:port` entries from `path`, skipping blank lines and `#`
/// comments. A missing or empty file is an error.
pub fn read_seeds(path: impl AsRef<Path>) -> Result<Vec<String>, PeerError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| PeerError::SeedsFile {
        path: path.to_path_buf(),
        source,
    })?;
    let seeds: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();
    if seeds.is_empty() {
        return Err(PeerError::NoSeeds(path.to_path_buf()));
    }
    Ok(seeds)
}

/// HTTP client bound to a single peer.
#[derive(Clone, Debug)]
pub struct PeerClient {
    base_url: String,
    client: Client,
}

impl PeerClient {
    /// `addr` is either `host:port` or a full `http://` URL.
    pub fn new(addr: &str, timeout: Duration) -> Result<Self, PeerError> {
        let base_url = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", addr.trim_end_matches('/'))
        };
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| PeerError::Transport {
                url: base_url.clone(),
                source,
            })?;
        Ok(Self { base_url, client })
    }

    /// Connects to the first seed that answers `GET /health`.
    pub async fn connect_first(seeds: &[String], timeout: Duration) -> Result<Self, PeerError> {
        for seed in seeds {
            let peer = Self::new(seed, timeout)?;
            match peer.health().await {
                Ok(()) => {
                    info!(peer = %peer.base_url, "connected to node");
                    return Ok(peer);
                }
                Err(e) => debug!(peer = %seed, error = %e, "seed unreachable"),
            }
        }
        Err(PeerError::NoneOnline)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn health(&self) -> Result<(), PeerError> {
        let url = self.endpoint("/health");
        let resp = self.client.get(&url).send().await.map_err(|source| PeerError::Transport {
            url: url.clone(),
            source,
        })?;
        check_status(url, resp.status())
    }

    /// Submits a transaction; a rejection is returned in the response
    /// body rather than as an error.
    pub async fn send_tx(
        &self,
        transaction: Transaction,
        target_symbol: &str,
    ) -> Result<TxResponse, PeerError> {
        let url = self.endpoint("/tx");
        let body = TxRequest {
            transaction,
            target_symbol: target_symbol.to_string(),
        };
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|source| PeerError::Transport {
                url: url.clone(),
                source,
            })?;
        let status = resp.status();
        if !status.is_success() && status != StatusCode::UNPROCESSABLE_ENTITY {
            return Err(PeerError::Status { url, status });
        }
        resp.json::<TxResponse>()
            .await
            .map_err(|source| PeerError::Transport { url, source })
    }

    /// Fetches every block of `chain`, genesis first.
    pub async fn fetch_blocks(&self, chain: ChainName) -> Result<Vec<Block>, PeerError> {
        let url = self.endpoint(&format!("/chains/{chain}/blocks"));
        let resp = self.client.get(&url).send().await.map_err(|source| PeerError::Transport {
            url: url.clone(),
            source,
        })?;
        check_status(url.clone(), resp.status())?;
        resp.json::<Vec<Block>>()
            .await
            .map_err(|source| PeerError::Transport { url, source })
    }

    /// Offers a freshly mined block to the peer.
    pub async fn announce_block(&self, chain: ChainName, block: &Block) -> Result<(), PeerError> {
        let url = self.endpoint(&format!("/chains/{chain}/blocks"));
        let resp = self
            .client
            .post(&url)
            .json(block)
            .send()
            .await
            .map_err(|source| PeerError::Transport {
                url: url.clone(),
                source,
            })?;
        check_status(url, resp.status())
    }
}

fn check_status(url: String, status: StatusCode) -> Result<(), PeerError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(PeerError::Status { url, status })
    }
}
