//! Prometheus-backed metrics and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry and a set of strongly-typed consensus metrics, and an
//! async HTTP exporter that serves `/metrics` using `hyper`.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, header, header::HeaderValue,
    server::conn::http1, service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{info, warn};

use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

/// Consensus-related Prometheus metrics.
///
/// Per-ledger series carry a `chain` label (`NATIVE_CHAIN` or
/// `MATCH_CHAIN`).
#[derive(Clone)]
pub struct ConsensusMetrics {
    /// Blocks appended to a chain, mined locally or imported.
    pub blocks_appended: IntCounterVec,
    /// Peer blocks rejected by validation or transaction application.
    pub blocks_rejected: IntCounterVec,
    /// Appends that lost the race for the tip.
    pub stale_tips: IntCounterVec,
    /// Transactions accepted into a pending pool.
    pub txs_admitted: IntCounterVec,
    /// Transactions rejected at admission.
    pub txs_rejected: IntCounterVec,
    /// Current size of each pending pool.
    pub pending_txs: IntGaugeVec,
    /// Time spent searching for a proof of work, in seconds.
    pub pow_seal_seconds: Histogram,
    /// Time spent rebuilding a state from genesis, in seconds.
    pub replay_seconds: Histogram,
}

impl ConsensusMetrics {
    /// Registers consensus metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let counter = |name: &str, help: &str| -> Result<IntCounterVec, prometheus::Error> {
            let c = IntCounterVec::new(Opts::new(name, help), &["chain"])?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        let blocks_appended = counter(
            "consensus_blocks_appended_total",
            "Total number of blocks appended to a chain",
        )?;
        let blocks_rejected = counter(
            "consensus_blocks_rejected_total",
            "Total number of peer blocks rejected",
        )?;
        let stale_tips = counter(
            "consensus_stale_tip_total",
            "Total number of appends rejected because the tip moved",
        )?;
        let txs_admitted = counter(
            "consensus_txs_admitted_total",
            "Total number of transactions admitted to a pending pool",
        )?;
        let txs_rejected = counter(
            "consensus_txs_rejected_total",
            "Total number of transactions rejected at admission",
        )?;

        let pending_txs = IntGaugeVec::new(
            Opts::new("consensus_pending_txs", "Transactions waiting to be mined"),
            &["chain"],
        )?;
        registry.register(Box::new(pending_txs.clone()))?;

        let pow_seal_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "consensus_pow_seal_seconds",
                "Time to find a proof of work for a block in seconds",
            )
            .buckets(vec![
                0.001, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
            ]),
        )?;
        registry.register(Box::new(pow_seal_seconds.clone()))?;

        let replay_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "consensus_replay_seconds",
                "Time to rebuild a chain state from genesis in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
        )?;
        registry.register(Box::new(replay_seconds.clone()))?;

        Ok(Self {
            blocks_appended,
            blocks_rejected,
            stale_tips,
            txs_admitted,
            txs_rejected,
            pending_txs,
            pow_seal_seconds,
            replay_seconds,
        })
    }
}

/// Wrapper around a Prometheus registry and the consensus metrics.
///
/// This is the main handle you pass around in the node. It can be wrapped
/// in an [`Arc`] and shared across threads/tasks.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub consensus: ConsensusMetrics,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with a fresh underlying `Registry`
    /// and registers the consensus metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("dex".to_string()), None)?;
        let consensus = ConsensusMetrics::register(&registry)?;
        Ok(Self {
            registry,
            consensus,
        })
    }

    /// Encodes all metrics in this registry into the Prometheus text format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            warn!(error = %e, "failed to encode Prometheus metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Runs an HTTP server that exposes Prometheus metrics.
///
/// The server listens on `addr` and serves `GET /metrics` with the
/// Prometheus text exposition format. All other paths return 404.
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "metrics exporter listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                warn!(error = %err, "prometheus HTTP connection error");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(render(req.method(), req.uri().path(), &metrics))
}

fn render(method: &Method, path: &str, metrics: &MetricsRegistry) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/metrics") => {
            let mut resp = Response::new(Full::new(Bytes::from(metrics.gather_text())));
            resp.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            resp
        }
        _ => {
            let mut resp = Response::new(Full::new(Bytes::from("not found")));
            *resp.status_mut() = StatusCode::NOT_FOUND;
            resp
        }
    }
}
