use async_trait::async_trait;

use crate::{OrderPage, PageRequest, Result};

/// Abstraction over the exchange's order endpoints.
///
/// `BitgetClient` implements this against the live REST API.
/// `PaperExchange` implements this for offline runs and tests.
///
/// One call fetches exactly one page and performs no retries. Retry and
/// cursor-following are layered on top by `extractor::pagination`.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Fetch a single page of raw orders.
    async fn fetch_page(&self, request: &PageRequest) -> Result<OrderPage>;

    /// Short backend name used in logs and the health endpoint.
    fn name(&self) -> &'static str;
}
