//! HTTP routes served by a node.
//!
//! - `GET /health`
//! - `POST /tx`
//! - `GET|POST /chains/{name}/blocks`
//! - `GET /chains/{name}/state`

use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};

use crate::state::SharedState;

pub mod blocks;
pub mod health;
pub mod snapshot;
pub mod tx;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/tx", post(tx::submit_tx))
        .route(
            "/chains/{name}/blocks",
            get(blocks::list_blocks).post(blocks::import_block),
        )
        .route("/chains/{name}/state", get(snapshot::chain_state))
        .with_state(state)
}

type ApiError = (StatusCode, String);

fn internal(e: impl ToString) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
