use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use dexchain::{Block, ChainError, ChainName, ConsensusError, ImportOutcome};

use super::{ApiError, internal};
use crate::state::SharedState;

/// Response body for `POST /chains/{name}/blocks`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ImportResponse {
    /// `appended`, `known` or `rejected`.
    pub status: String,
    pub height: Option<u64>,
    pub error: Option<String>,
}

fn parse_chain(name: &str) -> Result<ChainName, ApiError> {
    name.parse()
        .map_err(|_| (StatusCode::NOT_FOUND, format!("unknown chain: {name}")))
}

/// `GET /chains/{name}/blocks`
///
/// Every block of the chain, genesis first.
pub async fn list_blocks(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<Block>>, ApiError> {
    let chain = parse_chain(&name)?;
    state
        .blocking(move |engine| engine.chain(chain).blocks_from_genesis())
        .await
        .map_err(internal)?
        .map(Json)
        .map_err(internal)
}

/// `POST /chains/{name}/blocks`
///
/// Imports a block announced by a peer. Blocks that do not extend our tip
/// are `409`; blocks that fail validation are `422`.
pub async fn import_block(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Json(block): Json<Block>,
) -> Result<(StatusCode, Json<ImportResponse>), ApiError> {
    let chain = parse_chain(&name)?;
    let hash = block.hash;
    let imported = state
        .blocking(move |engine| engine.import_block(chain, block))
        .await
        .map_err(internal)?;
    let response = match imported {
        Ok(ImportOutcome::Appended(tip)) => {
            info!(%chain, height = tip.height, %hash, "peer block appended");
            (
                StatusCode::OK,
                ImportResponse {
                    status: "appended".to_string(),
                    height: Some(tip.height),
                    error: None,
                },
            )
        }
        Ok(ImportOutcome::AlreadyKnown) => (
            StatusCode::OK,
            ImportResponse {
                status: "known".to_string(),
                height: None,
                error: None,
            },
        ),
        Err(e) => {
            warn!(%chain, %hash, error = %e, "peer block not imported");
            (
                rejection_status(&e),
                ImportResponse {
                    status: "rejected".to_string(),
                    height: None,
                    error: Some(e.to_string()),
                },
            )
        }
    };
    Ok((response.0, Json(response.1)))
}

fn rejection_status(e: &ConsensusError) -> StatusCode {
    match e {
        ConsensusError::Chain(ChainError::ChainLinkageBroken { .. })
        | ConsensusError::Chain(ChainError::StaleTip { .. }) => StatusCode::CONFLICT,
        ConsensusError::Validation(_)
        | ConsensusError::InvalidBlockTransaction { .. }
        | ConsensusError::Chain(ChainError::InvalidProofOfWork(_)) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
