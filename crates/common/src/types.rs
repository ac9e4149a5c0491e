use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, ShardError};

/// Half-open time range `[start_ms, end_ms)` in epoch milliseconds (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl TimeWindow {
    pub fn new(start_ms: i64, end_ms: i64) -> Result<Self> {
        if start_ms >= end_ms {
            return Err(Error::InvalidRequest(format!(
                "time window start ({start_ms}) must be before end ({end_ms})"
            )));
        }
        Ok(Self { start_ms, end_ms })
    }

    pub fn span_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }

    pub fn contains(&self, ts_ms: i64) -> bool {
        self.start_ms <= ts_ms && ts_ms < self.end_ms
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start_ms, self.end_ms)
    }
}

/// Where shards run: in-process tasks or independently invoked remote workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Local,
    Remote,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Local => write!(f, "local"),
            ExecutionMode::Remote => write!(f, "remote"),
        }
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(ExecutionMode::Local),
            "remote" => Ok(ExecutionMode::Remote),
            other => Err(Error::InvalidRequest(format!(
                "execution mode must be 'local' or 'remote', got '{other}'"
            ))),
        }
    }
}

/// A validated extraction request. Construct through [`ExtractionRequest::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    symbols: Vec<String>,
    window: Option<TimeWindow>,
    mode: Option<ExecutionMode>,
}

impl ExtractionRequest {
    /// Symbols are trimmed and de-duplicated keeping first-occurrence order.
    /// Blank symbols or an empty list are rejected.
    pub fn new(
        symbols: impl IntoIterator<Item = impl Into<String>>,
        window: Option<TimeWindow>,
        mode: Option<ExecutionMode>,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut distinct = Vec::new();
        for symbol in symbols {
            let symbol: String = symbol.into();
            let symbol = symbol.trim();
            if symbol.is_empty() {
                return Err(Error::InvalidRequest("symbols must not be blank".into()));
            }
            if seen.insert(symbol.to_string()) {
                distinct.push(symbol.to_string());
            }
        }
        if distinct.is_empty() {
            return Err(Error::InvalidRequest("symbols list cannot be empty".into()));
        }
        if let Some(w) = window {
            // Re-validate: the fields are public and may have been built directly.
            TimeWindow::new(w.start_ms, w.end_ms)?;
        }
        Ok(Self {
            symbols: distinct,
            window,
            mode,
        })
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn window(&self) -> Option<TimeWindow> {
        self.window
    }

    pub fn mode(&self) -> Option<ExecutionMode> {
        self.mode
    }
}

/// One unit of work: a single symbol over a single (sub-)window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardTask {
    pub id: String,
    pub symbol: String,
    /// `None` = current/open orders mode.
    pub window: Option<TimeWindow>,
    pub attempt: u32,
}

impl ShardTask {
    pub fn new(symbol: impl Into<String>, index: usize, window: Option<TimeWindow>) -> Self {
        let symbol = symbol.into();
        Self {
            id: format!("{symbol}#{index}"),
            symbol,
            window,
            attempt: 1,
        }
    }
}

/// Side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// Exchange order normalized into the extractor's shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_type: Option<String>,
    pub price: f64,
    pub quantity: f64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Query for one page of orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub symbol: String,
    pub window: Option<TimeWindow>,
    pub cursor: Option<String>,
    pub limit: u32,
}

/// One page of raw exchange orders. Items are left as JSON so the worker can
/// reject malformed entries individually.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderPage {
    pub items: Vec<serde_json::Value>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ShardOutcome {
    Success(Vec<OrderRecord>),
    Failed(ShardError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardResult {
    pub shard_id: String,
    pub symbol: String,
    pub window: Option<TimeWindow>,
    pub outcome: ShardOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ShardResult {
    pub fn success(
        task: &ShardTask,
        orders: Vec<OrderRecord>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self::with_outcome(task, ShardOutcome::Success(orders), started_at, finished_at)
    }

    pub fn failed(
        task: &ShardTask,
        error: ShardError,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self::with_outcome(task, ShardOutcome::Failed(error), started_at, finished_at)
    }

    fn with_outcome(
        task: &ShardTask,
        outcome: ShardOutcome,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            shard_id: task.id.clone(),
            symbol: task.symbol.clone(),
            window: task.window,
            outcome,
            started_at,
            finished_at,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ShardOutcome::Success(_))
    }

    /// Records of a successful shard; empty for a failed one.
    pub fn orders(&self) -> &[OrderRecord] {
        match &self.outcome {
            ShardOutcome::Success(orders) => orders,
            ShardOutcome::Failed(_) => &[],
        }
    }

    pub fn error(&self) -> Option<&ShardError> {
        match &self.outcome {
            ShardOutcome::Failed(e) => Some(e),
            ShardOutcome::Success(_) => None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}

/// Overall outcome of an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Success,
    PartialSuccess,
    Failure,
}

impl std::fmt::Display for ExtractionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionStatus::Success => write!(f, "success"),
            ExtractionStatus::PartialSuccess => write!(f, "partial_success"),
            ExtractionStatus::Failure => write!(f, "failure"),
        }
    }
}

/// A failed slice the caller can retry on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedShard {
    pub shard_id: String,
    pub symbol: String,
    pub window: Option<TimeWindow>,
    pub error: ShardError,
}

/// Terminal, merged result of one extraction request.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    pub status: ExtractionStatus,
    pub orders: Vec<OrderRecord>,
    pub total_orders: usize,
    /// Distinct symbols across all shards, failed ones included.
    pub symbols_processed: usize,
    pub duration: Duration,
    pub errors: Vec<FailedShard>,
}

/// Convert epoch milliseconds into a UTC timestamp.
pub fn millis_to_utc(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}
