use std::cmp::Ordering;
use std::collections::BTreeSet;

use common::{ExtractionResult, ExtractionStatus, FailedShard, OrderRecord, ShardOutcome, ShardResult};

/// Merge shard results into the final response.
///
/// Output is independent of the order `results` arrive in: shards are first
/// arranged by shard id, then all records are stably sorted by
/// (`created_at`, `symbol`, `order_id`).
pub fn merge(mut results: Vec<ShardResult>) -> ExtractionResult {
    results.sort_by(|a, b| a.shard_id.cmp(&b.shard_id));

    let started = results.iter().map(|r| r.started_at).min();
    let finished = results.iter().map(|r| r.finished_at).max();
    let duration = match (started, finished) {
        (Some(s), Some(f)) => (f - s).to_std().unwrap_or_default(),
        _ => Default::default(),
    };

    let symbols_processed = results
        .iter()
        .map(|r| r.symbol.as_str())
        .collect::<BTreeSet<_>>()
        .len();
    let succeeded = results.iter().filter(|r| r.is_success()).count();
    let status = if succeeded == results.len() {
        ExtractionStatus::Success
    } else if succeeded == 0 {
        ExtractionStatus::Failure
    } else {
        ExtractionStatus::PartialSuccess
    };

    let mut orders = Vec::new();
    let mut errors = Vec::new();
    for result in results {
        match result.outcome {
            ShardOutcome::Success(batch) => orders.extend(batch),
            ShardOutcome::Failed(error) => errors.push(FailedShard {
                shard_id: result.shard_id,
                symbol: result.symbol,
                window: result.window,
                error,
            }),
        }
    }
    orders.sort_by(order_key);

    ExtractionResult {
        status,
        total_orders: orders.len(),
        symbols_processed,
        orders,
        duration,
        errors,
    }
}

fn order_key(a: &OrderRecord, b: &OrderRecord) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.symbol.cmp(&b.symbol))
        .then_with(|| a.order_id.cmp(&b.order_id))
}
