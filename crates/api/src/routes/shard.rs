use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use tracing::info;

use common::{ShardResult, ShardTask};

use crate::{ApiError, AppState};

/// Remote worker endpoint: any instance can run shards for another one.
pub fn shard_router() -> Router<AppState> {
    Router::new().route("/shard", post(run_shard))
}

async fn run_shard(
    State(state): State<AppState>,
    body: Result<Json<ShardTask>, JsonRejection>,
) -> Result<Json<ShardResult>, ApiError> {
    let Json(task) = body?;
    info!(shard = %task.id, symbol = %task.symbol, attempt = task.attempt, "Shard received");
    Ok(Json(state.worker.run(task).await))
}
