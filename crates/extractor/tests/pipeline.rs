use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::{
    ErrorKind, ExtractionRequest, ExtractionSettings, ExtractionStatus, RetrySettings, TimeWindow,
};
use extractor::{Coordinator, LocalInvoker, Worker};
use paper::{Fault, PaperExchange};

fn settings() -> ExtractionSettings {
    ExtractionSettings {
        max_concurrency: 4,
        deadline_ms: 5_000,
        page_limit: 25,
        retry: RetrySettings {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 100,
            jitter: 0.0,
        },
        ..ExtractionSettings::default()
    }
}

fn coordinator(exchange: Arc<PaperExchange>, settings: ExtractionSettings) -> Coordinator {
    let worker = Worker::from_settings(exchange, &settings);
    Coordinator::new(Arc::new(LocalInvoker::new(worker)), settings)
}

#[tokio::test]
async fn two_symbols_merge_into_one_ascending_result() {
    let exchange = Arc::new(PaperExchange::new());
    exchange.seed_generated("BTCUSDT", 80, 1_000, 10).await;
    exchange.seed_generated("ETHUSDT", 70, 1_005, 10).await;

    let req = ExtractionRequest::new(["BTCUSDT", "ETHUSDT"], None, None).unwrap();
    let result = coordinator(exchange, settings()).extract(&req).await;

    assert_eq!(result.status, ExtractionStatus::Success);
    assert_eq!(result.total_orders, 150);
    assert_eq!(result.orders.len(), 150);
    assert!(result
        .orders
        .windows(2)
        .all(|pair| pair[0].created_at <= pair[1].created_at));
    assert!(result.errors.is_empty());
}

#[tokio::test(start_paused = true)]
async fn rate_limit_exhaustion_on_one_shard_is_partial_success() {
    let exchange = Arc::new(PaperExchange::new());
    exchange.seed_generated("BTCUSDT", 30, 0, 10).await;
    exchange.seed_generated("ETHUSDT", 30, 0, 10).await;
    exchange.inject("ETHUSDT", Fault::RateLimited { times: 100 }).await;

    let req = ExtractionRequest::new(["BTCUSDT", "ETHUSDT"], None, None).unwrap();
    let result = coordinator(exchange.clone(), settings()).extract(&req).await;

    assert_eq!(result.status, ExtractionStatus::PartialSuccess);
    assert_eq!(result.total_orders, 30);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].symbol, "ETHUSDT");
    assert_eq!(result.errors[0].error.kind, ErrorKind::RateLimited);
    // Bounded: exactly max_attempts calls were made.
    assert_eq!(exchange.calls("ETHUSDT").await, 3);
}

#[tokio::test(start_paused = true)]
async fn rate_limit_exhaustion_on_the_only_shard_is_failure() {
    let exchange = Arc::new(PaperExchange::new());
    exchange.seed_generated("ETHUSDT", 30, 0, 10).await;
    exchange.inject("ETHUSDT", Fault::RateLimited { times: 100 }).await;

    let req = ExtractionRequest::new(["ETHUSDT"], None, None).unwrap();
    let result = coordinator(exchange, settings()).extract(&req).await;

    assert_eq!(result.status, ExtractionStatus::Failure);
    assert_eq!(result.total_orders, 0);
}

#[tokio::test(start_paused = true)]
async fn transient_rate_limit_is_absorbed_by_retries() {
    let exchange = Arc::new(PaperExchange::new());
    exchange.seed_generated("BTCUSDT", 10, 0, 10).await;
    exchange.inject("BTCUSDT", Fault::RateLimited { times: 2 }).await;

    let req = ExtractionRequest::new(["BTCUSDT"], None, None).unwrap();
    let result = coordinator(exchange, settings()).extract(&req).await;

    assert_eq!(result.status, ExtractionStatus::Success);
    assert_eq!(result.total_orders, 10);
}

#[tokio::test]
async fn authentication_failure_is_not_retried() {
    let exchange = Arc::new(PaperExchange::new());
    exchange.inject("BTCUSDT", Fault::Unauthorized).await;

    let req = ExtractionRequest::new(["BTCUSDT"], None, None).unwrap();
    let result = coordinator(exchange.clone(), settings()).extract(&req).await;

    assert_eq!(result.status, ExtractionStatus::Failure);
    assert_eq!(result.errors[0].error.kind, ErrorKind::Authentication);
    assert_eq!(exchange.calls("BTCUSDT").await, 1);
}

#[tokio::test(start_paused = true)]
async fn shard_past_the_deadline_times_out_others_are_kept() {
    let exchange = Arc::new(PaperExchange::new());
    for symbol in ["BTCUSDT", "ETHUSDT", "SOLUSDT"] {
        exchange.seed_generated(symbol, 5, 0, 10).await;
    }
    exchange.inject("SOLUSDT", Fault::Latency(Duration::from_secs(600))).await;

    let req = ExtractionRequest::new(["BTCUSDT", "ETHUSDT", "SOLUSDT"], None, None).unwrap();
    let result = coordinator(exchange, settings()).extract(&req).await;

    assert_eq!(result.status, ExtractionStatus::PartialSuccess);
    assert_eq!(result.total_orders, 10);
    assert!(result.orders.iter().all(|o| o.symbol != "SOLUSDT"));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].symbol, "SOLUSDT");
    assert_eq!(result.errors[0].error.kind, ErrorKind::Timeout);
}

#[tokio::test]
async fn split_history_window_returns_each_order_once() {
    let exchange = Arc::new(PaperExchange::new());
    // One order per second over [0, 100s), plus one on the exclusive end.
    exchange.seed_generated("BTCUSDT", 101, 0, 1_000).await;

    let settings = ExtractionSettings {
        max_window_span_ms: 30_000,
        ..settings()
    };
    let window = TimeWindow::new(0, 100_000).unwrap();
    let req = ExtractionRequest::new(["BTCUSDT"], Some(window), None).unwrap();
    let result = coordinator(exchange, settings).extract(&req).await;

    assert_eq!(result.status, ExtractionStatus::Success);
    assert_eq!(result.total_orders, 100);
    let ids: HashSet<&str> = result.orders.iter().map(|o| o.order_id.as_str()).collect();
    assert_eq!(ids.len(), 100);
    assert!(result
        .orders
        .iter()
        .all(|o| window.contains(o.created_at.timestamp_millis())));
}

#[tokio::test]
async fn malformed_orders_are_dropped_not_fatal() {
    let exchange = Arc::new(PaperExchange::new());
    exchange
        .seed_orders(
            "BTCUSDT",
            vec![
                serde_json::json!({"orderId": "2", "side": "buy", "price": "1", "size": "1", "cTime": "2000"}),
                serde_json::json!({"orderId": "1", "side": "???", "price": "1", "size": "1", "cTime": "1000"}),
            ],
        )
        .await;

    let req = ExtractionRequest::new(["BTCUSDT"], None, None).unwrap();
    let result = coordinator(exchange, settings()).extract(&req).await;

    assert_eq!(result.status, ExtractionStatus::Success);
    assert_eq!(result.total_orders, 1);
    assert_eq!(result.orders[0].order_id, "2");
}
