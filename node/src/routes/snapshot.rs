use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use dexchain::{ChainName, StateSnapshot};

use super::{ApiError, internal};
use crate::state::SharedState;

/// `GET /chains/{name}/state`
///
/// Balances, owed balances, tokens and resting orders replayed up to the
/// chain's current tip.
pub async fn chain_state(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<StateSnapshot>, ApiError> {
    let chain: ChainName = name
        .parse()
        .map_err(|_| (StatusCode::NOT_FOUND, format!("unknown chain: {name}")))?;
    state
        .blocking(move |engine| engine.with_state(chain, |s| s.snapshot(chain)))
        .await
        .map_err(internal)?
        .map(Json)
        .map_err(internal)
}
