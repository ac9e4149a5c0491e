use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use chrono::DateTime;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use common::{ExecutionMode, ExtractionRequest, ExtractionResult, ExtractionStatus, TimeWindow};

use crate::{ApiError, AppState};

pub fn extract_router() -> Router<AppState> {
    Router::new()
        .route("/extract", post(extract))
        .route("/extract/history", post(extract_history))
}

#[derive(Debug, Deserialize)]
struct ExtractBody {
    symbols: Vec<String>,
    #[serde(default)]
    mode: Option<ExecutionMode>,
}

#[derive(Debug, Deserialize)]
struct HistoryBody {
    symbols: Vec<String>,
    #[serde(default)]
    mode: Option<ExecutionMode>,
    #[serde(default, alias = "start_time")]
    start: Option<TimeBound>,
    #[serde(default, alias = "end_time")]
    end: Option<TimeBound>,
}

/// A window bound: epoch milliseconds, or an RFC 3339 timestamp.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TimeBound {
    Millis(i64),
    Text(String),
}

impl TimeBound {
    fn to_millis(&self, field: &str) -> Result<i64, ApiError> {
        match self {
            TimeBound::Millis(ms) => Ok(*ms),
            TimeBound::Text(s) => {
                let s = s.trim();
                if let Ok(ms) = s.parse::<i64>() {
                    return Ok(ms);
                }
                DateTime::parse_from_rfc3339(s)
                    .map(|dt| dt.timestamp_millis())
                    .map_err(|e| {
                        ApiError::bad_request(format!(
                            "'{field}' must be epoch milliseconds or an RFC 3339 timestamp: {e}"
                        ))
                    })
            }
        }
    }
}

async fn extract(
    State(state): State<AppState>,
    body: Result<Json<ExtractBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body?;
    let request = ExtractionRequest::new(body.symbols, None, body.mode)?;
    run(&state, request).await
}

async fn extract_history(
    State(state): State<AppState>,
    body: Result<Json<HistoryBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body?;
    let start = body
        .start
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("'start' is required"))?
        .to_millis("start")?;
    let end = body
        .end
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("'end' is required"))?
        .to_millis("end")?;

    let window = TimeWindow::new(start, end)?;
    let request = ExtractionRequest::new(body.symbols, Some(window), body.mode)?;
    run(&state, request).await
}

async fn run(state: &AppState, request: ExtractionRequest) -> Result<Json<Value>, ApiError> {
    let mode = request.mode().unwrap_or(state.default_mode);
    let coordinator = state.coordinator(mode)?;
    info!(%mode, symbols = ?request.symbols(), window = ?request.window(), "Extraction requested");

    let result = coordinator.extract(&request).await;
    Ok(Json(render_result(&result)))
}

/// Response body for a finished extraction. Every core outcome, `failure`
/// included, is a well-formed 200 answer.
pub fn render_result(result: &ExtractionResult) -> Value {
    let seconds = (result.duration.as_secs_f64() * 100.0).round() / 100.0;
    json!({
        "success": result.status != ExtractionStatus::Failure,
        "status": result.status,
        "data": result.orders,
        "duration_seconds": seconds,
        "total_orders": result.total_orders,
        "symbols_processed": result.symbols_processed,
        "errors": result.errors,
    })
}
