use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use dexchain::{ChainName, ConsensusError, Transaction};

use crate::state::SharedState;

/// Request body for `POST /tx`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TxRequest {
    pub transaction: Transaction,
    /// Symbol (or chain name) that selects the ledger recording the
    /// transaction.
    pub target_symbol: String,
}

/// Response body for `POST /tx`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TxResponse {
    pub accepted: bool,
    /// Ledger the transaction was routed to, when known.
    pub chain: Option<ChainName>,
    pub error: Option<String>,
}

/// `POST /tx`
///
/// Validates the transaction against the tip of the chain its target
/// symbol routes to and queues it for mining. Rejections are `422` with
/// the reason in `error`.
pub async fn submit_tx(
    State(state): State<SharedState>,
    Json(body): Json<TxRequest>,
) -> (StatusCode, Json<TxResponse>) {
    let kind = body.transaction.kind();
    let TxRequest {
        transaction,
        target_symbol,
    } = body;
    let submitted = state
        .blocking(move |engine| engine.submit(transaction, &target_symbol))
        .await;
    let submitted = match submitted {
        Ok(result) => result,
        Err(e) => {
            warn!(kind, "submission task failed: {e}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(TxResponse {
                    accepted: false,
                    chain: None,
                    error: Some(e.to_string()),
                }),
            );
        }
    };
    match submitted {
        Ok(chain) => {
            info!(%chain, kind, "accepted transaction");
            (
                StatusCode::OK,
                Json(TxResponse {
                    accepted: true,
                    chain: Some(chain),
                    error: None,
                }),
            )
        }
        Err(ConsensusError::Transaction { chain, source }) => {
            warn!(%chain, kind, error = %source, "rejected transaction");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(TxResponse {
                    accepted: false,
                    chain: Some(chain),
                    error: Some(source.to_string()),
                }),
            )
        }
        Err(e) => {
            warn!(kind, error = %e, "failed to admit transaction");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(TxResponse {
                    accepted: false,
                    chain: None,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, header};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use dexchain::{Address, CreateToken, KeyPair, Signature, TokenInfo, Transfer};

    use crate::routes::router;
    use crate::state::testing::test_state;

    fn create(symbol: &str, owner: &KeyPair) -> Transaction {
        let mut tx = Transaction::CreateToken(CreateToken {
            token_info: TokenInfo {
                symbol: symbol.to_string(),
                supply: 1000,
                decimals: 2,
            },
            owner_address: owner.address(),
            signature: Signature::default(),
        });
        owner.sign_transaction(&mut tx);
        tx
    }

    async fn post(state: SharedState, body: TxRequest) -> (StatusCode, TxResponse) {
        let request = Request::post("/tx")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).expect("json")))
            .expect("request");
        let response = router(state).oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = response.into_body().collect().await.expect("body").to_bytes();
        (status, serde_json::from_slice(&bytes).expect("tx response"))
    }

    #[tokio::test]
    async fn valid_transaction_is_accepted_and_routed() {
        let (_dir, state) = test_state();
        let owner = KeyPair::generate();

        let (status, body) = post(
            state.clone(),
            TxRequest {
                transaction: create("FOO", &owner),
                target_symbol: "FOO".to_string(),
            },
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.accepted);
        assert_eq!(body.chain, Some(ChainName::Match));
        assert_eq!(state.engine.pending(ChainName::Match).len(), 1);
    }

    #[tokio::test]
    async fn invalid_transaction_is_unprocessable() {
        let (_dir, state) = test_state();
        let owner = KeyPair::generate();
        let mut tx = Transaction::Transfer(Transfer {
            id: 1,
            symbol: "NATIVE".to_string(),
            amount: 5,
            from_address: owner.address(),
            to_address: Address::from("B"),
            signature: Signature::default(),
        });
        owner.sign_transaction(&mut tx);

        let (status, body) = post(
            state.clone(),
            TxRequest {
                transaction: tx,
                target_symbol: "NATIVE".to_string(),
            },
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(!body.accepted);
        assert_eq!(body.chain, Some(ChainName::Native));
        assert!(body.error.expect("reason").contains("insufficient"));
        assert!(state.engine.pending(ChainName::Native).is_empty());
    }

    #[tokio::test]
    async fn submission_waiting_on_a_busy_chain_does_not_stall_the_runtime() {
        let (_dir, state) = test_state();
        let owner = KeyPair::generate();

        // Hold the matching chain's lock from a plain thread until told.
        let (held_tx, held_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let engine = state.engine.clone();
        let holder = thread::spawn(move || {
            engine
                .with_state(ChainName::Match, |_| {
                    held_tx.send(()).expect("held");
                    let _ = release_rx.recv();
                })
                .expect("state");
        });
        held_rx.recv().expect("lock held");

        let request = TxRequest {
            transaction: create("FOO", &owner),
            target_symbol: "FOO".to_string(),
        };
        let in_flight = tokio::spawn(post(state.clone(), request));

        // Single-threaded runtime: this timer only fires if the handler
        // yielded while waiting for the lock.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!in_flight.is_finished());

        release_tx.send(()).expect("release");
        let (status, body) = in_flight.await.expect("join");
        holder.join().expect("holder");
        assert_eq!(status, StatusCode::OK);
        assert!(body.accepted);
    }
}
