use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::catalog::error::FetchFailed;
use crate::catalog::product::Product;
use crate::catalog::upstream::ProductSource;

#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Safety cap on requests per `fetch_all` call.
    pub max_requests: u32,
    /// Pause between page requests so the upstream rate limit is respected.
    pub page_delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_requests: 1000,
            page_delay: Duration::from_millis(200),
        }
    }
}

/// Drives cursor-based pagination against a [`ProductSource`] until the whole
/// catalog (or a category slice of it) has been assembled.
#[derive(Clone)]
pub struct CatalogFetcher {
    source: Arc<dyn ProductSource>,
    config: FetchConfig,
}

impl CatalogFetcher {
    pub fn new(source: Arc<dyn ProductSource>, config: FetchConfig) -> Self {
        Self { source, config }
    }

    /// Fetch every product, page by page. Termination, checked per page:
    /// empty page, absent cursor, a cursor that did not advance (upstream
    /// anomaly), or the request cap.
    ///
    /// A page failure after retries aborts the loop but keeps what was
    /// already accumulated; only a fetch that yields nothing at all is an
    /// error.
    pub async fn fetch_all(&self, group_id: Option<i64>) -> Result<Vec<Product>, FetchFailed> {
        let mut all: Vec<Product> = Vec::new();
        let mut cursor: Option<String> = None;
        let mut requests: u32 = 0;

        loop {
            if requests >= self.config.max_requests {
                warn!(
                    requests,
                    total = all.len(),
                    "request cap reached; returning truncated catalog"
                );
                break;
            }
            requests += 1;

            let page = match self.source.fetch_page(cursor.as_deref(), group_id).await {
                Ok(page) => page,
                Err(err) => {
                    if all.is_empty() {
                        return Err(FetchFailed {
                            requests,
                            source: err,
                        });
                    }
                    warn!(
                        requests,
                        total = all.len(),
                        error = %err,
                        "page request failed; keeping partial catalog"
                    );
                    break;
                }
            };

            if page.products.is_empty() {
                break;
            }

            let next = page.next_cursor();
            all.extend(page.products);

            if requests % 10 == 0 {
                info!(requests, total = all.len(), "catalog fetch progress");
            }

            match next {
                None => break,
                Some(next) if Some(&next) == cursor.as_ref() => {
                    warn!(cursor = %next, "upstream cursor did not advance; stopping");
                    break;
                }
                Some(next) => cursor = Some(next),
            }

            sleep(self.config.page_delay).await;
        }

        let before = all.len();
        let all = dedupe_by_id(all);
        if all.len() < before {
            warn!(
                dropped = before - all.len(),
                total = all.len(),
                "dropped duplicate product ids from overlapping pages"
            );
        }
        info!(requests, total = all.len(), "catalog fetch complete");
        Ok(all)
    }
}

/// Keep the first occurrence of every product id, preserving order. Guards
/// against upstream cursor anomalies that repeat or overlap pages.
pub fn dedupe_by_id(products: Vec<Product>) -> Vec<Product> {
    let mut seen: HashSet<String> = HashSet::with_capacity(products.len());
    products
        .into_iter()
        .filter(|p| seen.insert(p.id_key()))
        .collect()
}
