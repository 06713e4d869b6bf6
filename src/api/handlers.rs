use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::engine::Engine;
use crate::error::ChainError;
use crate::metrics;
use crate::types::Block;

pub type ApiResult<T> = Result<T, ChainError>;

/// `GET /` — §6.
pub async fn root_handler() -> impl IntoResponse {
    Json(json!({ "welcome": "in blockchain" }))
}

/// `GET /metrics` — ambient addition (§4.9), not part of the spec'd table.
pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

/// `POST /blocks` — §6.
pub async fn submit_block_handler(
    State(engine): State<Arc<Engine>>,
    Json(block): Json<Block>,
) -> ApiResult<impl IntoResponse> {
    let summary = engine.submit_block(block).await?;
    Ok(Json(
        json!({ "status": "Block accepted", "height": summary.height }),
    ))
}

/// `GET /blocks` — §6. Ordered by height ascending, per §4.6's ListBlocks.
pub async fn list_blocks_handler(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    let blocks = engine.list_blocks().await;
    let current_height = blocks.last().map(|b| b.height).unwrap_or(0);
    let body: Vec<_> = blocks
        .iter()
        .map(|b| json!({ "id": b.id, "height": b.height }))
        .collect();
    let count = body.len();
    Json(json!({
        "blocks": body,
        "count": count,
        "currentHeight": current_height,
    }))
}

/// `GET /balance/:address` — §6. Unknown addresses return 0, never an error.
pub async fn balance_handler(
    State(engine): State<Arc<Engine>>,
    Path(address): Path<String>,
) -> impl IntoResponse {
    let balance = engine.balance(&address).await;
    Json(json!({ "address": address, "balance": balance }))
}

/// `POST /rollback?height=N` — §6.
pub async fn rollback_handler(
    State(engine): State<Arc<Engine>>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<impl IntoResponse> {
    let raw = params
        .get("height")
        .cloned()
        .unwrap_or_else(|| "<missing>".to_string());
    // Only parseability is checked here; the `>= 1` precondition itself is
    // enforced by `Engine::rollback` (it's a Rewinder precondition, §4.5).
    let target: u64 = raw.parse().map_err(|_| ChainError::InvalidHeightParam {
        received: raw.clone(),
    })?;

    let new_height = engine.rollback(target).await?;
    Ok(Json(
        json!({ "status": "Rollback successful", "height": new_height }),
    ))
}

/// `POST /reset` — §6. Always lands on an empty chain, so the counts are
/// always zero on success.
pub async fn reset_handler(State(engine): State<Arc<Engine>>) -> ApiResult<impl IntoResponse> {
    engine.reset().await?;
    Ok(Json(json!({
        "status": "Reset successful",
        "currentHeight": 0,
        "blocksCount": 0,
        "utxosCount": 0,
        "balancesCount": 0,
    })))
}
