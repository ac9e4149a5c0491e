use std::sync::Arc;

use futures_util::stream::{self, BoxStream, StreamExt};
use tracing::{debug, warn};

use common::{ExchangeClient, ExtractionSettings, OrderPage, PageRequest, Result, RetryPolicy, TimeWindow};

/// Turns a single-page `ExchangeClient` into a retried, cursor-following
/// page sequence.
#[derive(Clone)]
pub struct Paginator {
    client: Arc<dyn ExchangeClient>,
    retry: RetryPolicy,
    page_limit: u32,
    max_pages: u32,
}

enum Cursor {
    Next { cursor: Option<String>, pages: u32 },
    Done,
}

impl Paginator {
    pub fn new(client: Arc<dyn ExchangeClient>, retry: RetryPolicy, page_limit: u32, max_pages: u32) -> Self {
        Self {
            client,
            retry,
            page_limit,
            max_pages: max_pages.max(1),
        }
    }

    pub fn from_settings(client: Arc<dyn ExchangeClient>, settings: &ExtractionSettings) -> Self {
        Self::new(
            client,
            RetryPolicy::from(&settings.retry),
            settings.page_limit,
            settings.max_pages,
        )
    }

    /// Lazily fetch every page for `symbol` over `window`.
    ///
    /// The stream ends after an empty page, a page without a cursor, a
    /// repeated cursor, `max_pages` pages, or the first terminal error (which
    /// is yielded as the last item). Each page is retried per the policy.
    pub fn fetch_orders(&self, symbol: &str, window: Option<TimeWindow>) -> BoxStream<'static, Result<OrderPage>> {
        let this = self.clone();
        let symbol = symbol.to_string();

        stream::unfold(
            Cursor::Next { cursor: None, pages: 0 },
            move |state| {
                let this = this.clone();
                let symbol = symbol.clone();
                async move {
                    let Cursor::Next { cursor, pages } = state else {
                        return None;
                    };
                    let request = PageRequest {
                        symbol: symbol.clone(),
                        window,
                        cursor: cursor.clone(),
                        limit: this.page_limit,
                    };
                    let client = &this.client;
                    let fetched = this
                        .retry
                        .run("fetch_page", || client.fetch_page(&request))
                        .await;

                    match fetched {
                        Ok(page) => {
                            let pages = pages + 1;
                            debug!(
                                symbol = %symbol,
                                page = pages,
                                items = page.items.len(),
                                next_cursor = ?page.next_cursor,
                                "Fetched order page"
                            );
                            let next = match &page.next_cursor {
                                Some(_) if page.items.is_empty() => Cursor::Done,
                                Some(next) if Some(next) == cursor.as_ref() => {
                                    warn!(symbol = %symbol, cursor = %next, "Exchange repeated cursor, stopping");
                                    Cursor::Done
                                }
                                Some(_) if pages >= this.max_pages => {
                                    warn!(
                                        symbol = %symbol,
                                        max_pages = this.max_pages,
                                        "Page limit reached with more data pending"
                                    );
                                    Cursor::Done
                                }
                                Some(next) => Cursor::Next {
                                    cursor: Some(next.clone()),
                                    pages,
                                },
                                None => Cursor::Done,
                            };
                            Some((Ok(page), next))
                        }
                        Err(e) => Some((Err(e), Cursor::Done)),
                    }
                }
            },
        )
        .boxed()
    }
}
