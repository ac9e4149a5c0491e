use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use common::{
    ErrorKind, ExtractionRequest, OrderRecord, OrderSide, ShardError, ShardResult, ShardTask,
    TimeWindow,
};
use extractor::merge;
use extractor::sharding::{plan_shards, split_window};

fn order(symbol: &str, id: u32, ts_ms: i64) -> OrderRecord {
    OrderRecord {
        order_id: id.to_string(),
        symbol: symbol.into(),
        side: OrderSide::Sell,
        order_type: None,
        price: 1.0,
        quantity: 1.0,
        status: "filled".into(),
        created_at: Utc.timestamp_millis_opt(ts_ms).unwrap(),
        updated_at: None,
    }
}

/// (succeeded, order timestamps) per shard.
fn shard_outcomes() -> impl Strategy<Value = Vec<(bool, Vec<i64>)>> {
    prop::collection::vec((any::<bool>(), prop::collection::vec(0i64..50, 0..8)), 1..6)
}

fn build_results(outcomes: &[(bool, Vec<i64>)]) -> Vec<ShardResult> {
    let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    outcomes
        .iter()
        .enumerate()
        .map(|(i, (ok, stamps))| {
            let symbol = format!("SYM{i}USDT");
            let task = ShardTask::new(symbol.clone(), 0, None);
            let started = base + Duration::milliseconds(i as i64);
            let finished = started + Duration::milliseconds(10);
            if *ok {
                let orders = stamps
                    .iter()
                    .enumerate()
                    .map(|(j, ts)| order(&symbol, j as u32, *ts))
                    .collect();
                ShardResult::success(&task, orders, started, finished)
            } else {
                ShardResult::failed(&task, ShardError::new(ErrorKind::Transient, "x"), started, finished)
            }
        })
        .collect()
}

proptest! {
    /// Sub-windows tile the original window: no gaps, no overlap, same bounds.
    #[test]
    fn split_window_tiles_exactly(
        start in -1_000_000i64..1_000_000,
        len in 1i64..1_000_000,
        span in 100u64..2_000_000,
    ) {
        let window = TimeWindow::new(start, start + len).unwrap();
        let pieces = split_window(window, span);

        prop_assert!(!pieces.is_empty());
        prop_assert_eq!(pieces.first().unwrap().start_ms, window.start_ms);
        prop_assert_eq!(pieces.last().unwrap().end_ms, window.end_ms);
        for p in &pieces {
            prop_assert!(p.start_ms < p.end_ms);
            prop_assert!(p.span_ms() as u64 <= span);
        }
        for pair in pieces.windows(2) {
            prop_assert_eq!(pair[0].end_ms, pair[1].start_ms);
        }
        let total: i64 = pieces.iter().map(|p| p.span_ms()).sum();
        prop_assert_eq!(total, len);
    }

    /// N distinct symbols and a window within the span yield exactly N shards.
    #[test]
    fn one_shard_per_distinct_symbol(n in 1usize..20, len in 1i64..1_000) {
        let symbols: Vec<String> = (0..n).map(|i| format!("S{i}")).collect();
        let window = TimeWindow::new(0, len).unwrap();
        let req = ExtractionRequest::new(symbols, Some(window), None).unwrap();
        prop_assert_eq!(plan_shards(&req, 1_000).len(), n);
    }

    /// Merge output does not depend on the order shard results arrive in.
    #[test]
    fn merge_is_order_independent(outcomes in shard_outcomes(), rotation in 0usize..6) {
        let results = build_results(&outcomes);
        let mut shuffled = results.clone();
        shuffled.reverse();
        let k = rotation % shuffled.len();
        shuffled.rotate_left(k);

        let a = merge(results);
        let b = merge(shuffled);
        prop_assert_eq!(a, b);
    }

    /// total_orders equals the sum over successful shards.
    #[test]
    fn total_counts_successful_records(outcomes in shard_outcomes()) {
        let expected: usize = outcomes.iter().filter(|(ok, _)| *ok).map(|(_, s)| s.len()).sum();
        let result = merge(build_results(&outcomes));
        prop_assert_eq!(result.total_orders, expected);
        prop_assert_eq!(result.orders.len(), expected);
        prop_assert_eq!(result.errors.len(), outcomes.iter().filter(|(ok, _)| !*ok).count());
    }
}
