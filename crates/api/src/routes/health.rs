use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::AppState;

pub fn health_router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// Liveness probe. No exchange call is made.
async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "order-extractor",
        "exchange": state.exchange,
        "mode": state.default_mode.to_string(),
        "remote_worker": state.remote.is_some(),
    }))
}
