use std::sync::Arc;

use chrono::Utc;
use futures_util::StreamExt;
use tracing::{info, warn};

use common::{ExchangeClient, ExtractionSettings, ShardError, ShardResult, ShardTask};

use crate::normalize::normalize_order;
use crate::pagination::Paginator;

/// Runs one shard to completion: fetches every page, normalizes the orders,
/// and captures any failure into the returned `ShardResult`.
#[derive(Clone)]
pub struct Worker {
    paginator: Paginator,
}

impl Worker {
    pub fn new(paginator: Paginator) -> Self {
        Self { paginator }
    }

    pub fn from_settings(client: Arc<dyn ExchangeClient>, settings: &ExtractionSettings) -> Self {
        Self::new(Paginator::from_settings(client, settings))
    }

    /// Never fails: errors become a `Failed` result. Orders keep the
    /// exchange's order.
    pub async fn run(&self, task: ShardTask) -> ShardResult {
        let started_at = Utc::now();
        let mut pages = self.paginator.fetch_orders(&task.symbol, task.window);
        let mut orders = Vec::new();
        let mut rejected = 0usize;

        while let Some(page) = pages.next().await {
            let page = match page {
                Ok(page) => page,
                Err(e) => {
                    warn!(shard = %task.id, symbol = %task.symbol, error = %e, "Shard failed");
                    return ShardResult::failed(&task, ShardError::from(e), started_at, Utc::now());
                }
            };
            for raw in &page.items {
                match normalize_order(raw, &task.symbol) {
                    Ok(order) => orders.push(order),
                    Err(reason) => {
                        rejected += 1;
                        warn!(shard = %task.id, reason = %reason, "Skipping malformed order");
                    }
                }
            }
        }

        let result = ShardResult::success(&task, orders, started_at, Utc::now());
        info!(
            shard = %task.id,
            symbol = %task.symbol,
            orders = result.orders().len(),
            rejected,
            elapsed_ms = result.elapsed().as_millis() as u64,
            "Shard completed"
        );
        result
    }
}
