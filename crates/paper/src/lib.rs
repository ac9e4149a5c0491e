use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{Error, ExchangeClient, OrderPage, PageRequest, Result};

/// Injected misbehaviour for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The next `times` calls answer with a rate-limit error.
    RateLimited { times: u32 },
    /// Every call fails authentication.
    Unauthorized,
    /// Every call is delayed by this long before answering.
    Latency(Duration),
}

/// Simulated exchange for offline runs and tests.
///
/// Orders are served newest first and paginated with Bitget's `idLessThan`
/// semantics. No network traffic is ever generated.
pub struct PaperExchange {
    /// Raw orders per symbol, newest first.
    orders: Arc<RwLock<HashMap<String, Vec<Value>>>>,
    faults: Arc<RwLock<HashMap<String, Fault>>>,
    calls: Arc<RwLock<HashMap<String, u32>>>,
}

impl Default for PaperExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperExchange {
    pub fn new() -> Self {
        Self {
            orders: Arc::new(RwLock::new(HashMap::new())),
            faults: Arc::new(RwLock::new(HashMap::new())),
            calls: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// A small book of generated history for local experimentation.
    pub async fn demo() -> Self {
        let exchange = Self::new();
        let now_ms = Utc::now().timestamp_millis();
        for (symbol, count) in [("BTCUSDT", 250), ("ETHUSDT", 180), ("SOLUSDT", 60)] {
            exchange
                .seed_generated(symbol, count, now_ms - 30 * 24 * 3_600_000, 3_600_000)
                .await;
        }
        info!("PaperExchange initialized with demo orders");
        exchange
    }

    /// Store raw orders for a symbol. They are re-sorted newest first.
    pub async fn seed_orders(&self, symbol: &str, mut orders: Vec<Value>) {
        orders.sort_by_key(|o| std::cmp::Reverse(ctime(o)));
        self.orders.write().await.insert(symbol.to_string(), orders);
    }

    /// Generate `count` filled orders starting at `first_ms`, one every `step_ms`.
    pub async fn seed_generated(&self, symbol: &str, count: usize, first_ms: i64, step_ms: i64) {
        let orders = (0..count)
            .map(|i| {
                let side = if i % 2 == 0 { "buy" } else { "sell" };
                let created_ms = first_ms + i as i64 * step_ms;
                json!({
                    "orderId": (1_000_000 + i as u64).to_string(),
                    "symbol": symbol,
                    "side": side,
                    "orderType": "limit",
                    "price": format!("{:.2}", 100.0 + (i % 50) as f64),
                    "size": "0.5",
                    "status": "filled",
                    "cTime": created_ms.to_string(),
                    "uTime": (created_ms + 500).to_string(),
                })
            })
            .collect();
        self.seed_orders(symbol, orders).await;
    }

    pub async fn inject(&self, symbol: &str, fault: Fault) {
        self.faults.write().await.insert(symbol.to_string(), fault);
    }

    /// Number of page requests received for a symbol.
    pub async fn calls(&self, symbol: &str) -> u32 {
        self.calls.read().await.get(symbol).copied().unwrap_or(0)
    }

    async fn apply_fault(&self, symbol: &str) -> Result<()> {
        let fault = self.faults.read().await.get(symbol).copied();
        match fault {
            Some(Fault::RateLimited { times }) if times > 0 => {
                self.faults
                    .write()
                    .await
                    .insert(symbol.to_string(), Fault::RateLimited { times: times - 1 });
                Err(Error::RateLimited { retry_after: None })
            }
            Some(Fault::Unauthorized) => {
                Err(Error::Authentication("40006: invalid ACCESS_KEY".into()))
            }
            Some(Fault::Latency(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn fetch_page(&self, request: &PageRequest) -> Result<OrderPage> {
        *self
            .calls
            .write()
            .await
            .entry(request.symbol.clone())
            .or_default() += 1;
        self.apply_fault(&request.symbol).await?;

        let cursor: Option<u64> = request.cursor.as_deref().and_then(|c| c.parse().ok());
        let orders = self.orders.read().await;
        let items: Vec<Value> = orders
            .get(&request.symbol)
            .map(|all| {
                all.iter()
                    .filter(|o| request.window.map_or(true, |w| w.contains(ctime(o))))
                    .filter(|o| cursor.map_or(true, |c| order_id(o) < c))
                    .take(request.limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let next_cursor = if !items.is_empty() && items.len() == request.limit as usize {
            items.last().map(|o| order_id(o).to_string())
        } else {
            None
        };

        debug!(
            symbol = %request.symbol,
            items = items.len(),
            next_cursor = ?next_cursor,
            "Paper page served"
        );
        Ok(OrderPage { items, next_cursor })
    }

    fn name(&self) -> &'static str {
        "paper"
    }
}

fn ctime(order: &Value) -> i64 {
    order
        .get("cTime")
        .and_then(|v| v.as_str().and_then(|s| s.parse().ok()).or_else(|| v.as_i64()))
        .unwrap_or(0)
}

fn order_id(order: &Value) -> u64 {
    order
        .get("orderId")
        .and_then(|v| v.as_str().and_then(|s| s.parse().ok()).or_else(|| v.as_u64()))
        .unwrap_or(0)
}
