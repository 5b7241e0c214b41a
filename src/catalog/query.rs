use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::catalog::cache::CacheStore;
use crate::catalog::error::{QueryError, UpstreamError};
use crate::catalog::product::Product;
use crate::catalog::upstream::ProductSource;

#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Upper clamp for the requested page size.
    pub max_page_size: usize,
    /// How long a cold-cache read waits for an in-flight refresh before
    /// giving up with `CacheUnavailable`.
    pub cold_wait: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_page_size: 100,
            cold_wait: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub current_page: usize,
    pub total_pages: usize,
    pub total_products: usize,
    pub per_page: usize,
    pub has_more: bool,
    pub showing: String,
}

#[derive(Debug, Serialize)]
pub struct ProductListing {
    pub products: Vec<Product>,
    pub pagination: Pagination,
}

/// Read side of the cache: offset/page-number pagination over the full list
/// or one category, plus single-item lookup with a live-upstream fallback.
#[derive(Clone)]
pub struct QueryService {
    cache: Arc<CacheStore>,
    source: Arc<dyn ProductSource>,
    config: QueryConfig,
}

impl QueryService {
    pub fn new(cache: Arc<CacheStore>, source: Arc<dyn ProductSource>, config: QueryConfig) -> Self {
        Self {
            cache,
            source,
            config,
        }
    }

    /// One page of products, optionally restricted to a category. The page
    /// is sliced from a single snapshot and sorted by numeric id so paging
    /// stays deterministic even when the cache is replaced between calls.
    pub async fn list(
        &self,
        page: usize,
        page_size: usize,
        category: Option<&str>,
    ) -> Result<ProductListing, QueryError> {
        if let Some(key) = category {
            if !self.cache.category_exists(key) {
                return Err(QueryError::UnknownCategory(key.to_string()));
            }
        }
        self.ensure_ready().await?;

        let snapshot = self.cache.snapshot();
        let mut items: Vec<Product> = match category {
            Some(key) => snapshot.by_category.get(key).cloned().unwrap_or_default(),
            None => snapshot.all.clone(),
        };
        sort_by_id(&mut items);

        let page = page.max(1);
        let per_page = page_size.clamp(1, self.config.max_page_size);
        let total = items.len();
        let total_pages = total.div_ceil(per_page);
        let start = (page - 1).saturating_mul(per_page);
        let end = start.saturating_add(per_page).min(total);
        let products = if start >= total {
            Vec::new()
        } else {
            items[start..end].to_vec()
        };

        let showing = if products.is_empty() {
            format!("0 of {total}")
        } else {
            format!("{}-{} of {total}", start + 1, end)
        };

        Ok(ProductListing {
            products,
            pagination: Pagination {
                current_page: page,
                total_pages,
                total_products: total,
                per_page,
                has_more: end < total,
                showing,
            },
        })
    }

    /// Single product: served from the cache when present, otherwise fetched
    /// live. This is the only read path allowed to touch the upstream.
    pub async fn get_by_id(&self, id: &str) -> Result<Product, QueryError> {
        if let Some(product) = self.cache.find_by_id(id) {
            return Ok(product);
        }
        match self.source.fetch_by_id(id).await {
            Ok(product) => Ok(product),
            Err(UpstreamError::NotFound) => Err(QueryError::NotFound(id.to_string())),
            Err(err) => Err(QueryError::Upstream(err)),
        }
    }

    pub fn categories(&self) -> Vec<String> {
        self.cache.category_keys()
    }

    /// Cold-start policy: an empty cache with a refresh in flight is worth a
    /// bounded wait; an empty cache with nothing in flight is unavailable.
    async fn ensure_ready(&self) -> Result<(), QueryError> {
        if !self.cache.is_empty() {
            return Ok(());
        }
        if self.cache.is_updating() {
            self.cache
                .wait_for_update_completion(self.config.cold_wait)
                .await;
            if !self.cache.is_empty() {
                return Ok(());
            }
        }
        Err(QueryError::CacheUnavailable)
    }
}

fn sort_by_id(items: &mut [Product]) {
    items.sort_by(|a, b| match (a.numeric_id(), b.numeric_id()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.id_key().cmp(&b.id_key()),
    });
}
