use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::catalog::cache::CacheStore;
use crate::catalog::fetcher::CatalogFetcher;
use crate::catalog::upstream::ProductSource;

/// Distinguishable outcome of a refresh request. `AlreadyRunning` is
/// informational, not a failure: a concurrent trigger lost the race and the
/// in-flight refresh will serve everyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Completed { total: usize },
    AlreadyRunning,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often the background timer re-evaluates staleness.
    pub period: Duration,
    /// Delay before the single retry when the startup refresh fails.
    pub retry_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(5 * 60),
            retry_delay: Duration::from_secs(5 * 60),
        }
    }
}

/// Owns the refresh lifecycle: decides when a refresh is due, guarantees at
/// most one runs at a time, and keeps the prior snapshot intact when a run
/// fails.
pub struct RefreshScheduler {
    cache: Arc<CacheStore>,
    fetcher: CatalogFetcher,
    source: Arc<dyn ProductSource>,
    config: SchedulerConfig,
}

/// Clears the updating flag when the refresh scope exits, on success,
/// failure or panic alike.
struct UpdateGuard<'a> {
    cache: &'a CacheStore,
}

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        self.cache.finish_update();
    }
}

impl RefreshScheduler {
    pub fn new(
        cache: Arc<CacheStore>,
        fetcher: CatalogFetcher,
        source: Arc<dyn ProductSource>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            cache,
            fetcher,
            source,
            config,
        }
    }

    /// Refresh unconditionally, unless one is already in flight.
    pub async fn force_refresh(&self) -> Result<RefreshOutcome> {
        if !self.cache.try_begin_update() {
            info!("refresh already in flight; not starting another");
            return Ok(RefreshOutcome::AlreadyRunning);
        }
        let _guard = UpdateGuard { cache: &self.cache };
        let total = self.run_refresh().await?;
        Ok(RefreshOutcome::Completed { total })
    }

    /// Refresh only when the cache is stale and nothing else is refreshing.
    /// Failures are logged here; the prior snapshot stays untouched.
    pub async fn maybe_refresh(&self) {
        if !self.cache.is_stale() || self.cache.is_updating() {
            return;
        }
        info!("cache is stale; starting background refresh");
        match self.force_refresh().await {
            Ok(RefreshOutcome::Completed { total }) => {
                info!(total, "background refresh complete");
            }
            Ok(RefreshOutcome::AlreadyRunning) => {}
            Err(err) => {
                error!(error = %err, "background refresh failed; previous snapshot retained");
            }
        }
    }

    async fn run_refresh(&self) -> Result<usize> {
        self.source
            .probe()
            .await
            .context("upstream connectivity probe failed")?;
        let products = self.fetcher.fetch_all(None).await?;
        let total = products.len();
        self.cache.replace_snapshot(products);
        Ok(total)
    }

    /// Background loop: one refresh at startup (with a single delayed retry
    /// on failure), then a staleness check every `period`. Stops when the
    /// shutdown channel fires.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if let Err(err) = self.force_refresh().await {
            warn!(
                error = %err,
                retry_secs = self.config.retry_delay.as_secs(),
                "initial catalog refresh failed; retrying once after delay"
            );
            tokio::select! {
                _ = sleep(self.config.retry_delay) => {
                    if let Err(err) = self.force_refresh().await {
                        error!(error = %err, "startup retry failed; cache stays empty until the timer succeeds");
                    }
                }
                _ = shutdown.recv() => {
                    info!("refresh scheduler: shutdown");
                    return;
                }
            }
        }

        let mut ticker = tokio::time::interval(self.config.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.maybe_refresh().await;
                }
                _ = shutdown.recv() => {
                    info!("refresh scheduler: shutdown");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::categorize::default_category_map;
    use crate::catalog::error::UpstreamError;
    use crate::catalog::fetcher::FetchConfig;
    use crate::catalog::product::{Product, ProductPage};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn product(id: i64, group: Option<i64>) -> Product {
        let value = match group {
            Some(g) => json!({"id": id, "group": {"id": g}}),
            None => json!({"id": id}),
        };
        serde_json::from_value(value).unwrap()
    }

    /// Serves the same single page on every fetch sequence, optionally
    /// slowly, optionally failing. Counts full fetch sequences started.
    struct FakeSource {
        products: Vec<Product>,
        delay: Duration,
        fail: bool,
        sequences: AtomicU32,
    }

    impl FakeSource {
        fn new(products: Vec<Product>) -> Self {
            Self {
                products,
                delay: Duration::from_millis(0),
                fail: false,
                sequences: AtomicU32::new(0),
            }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }
    }

    #[async_trait]
    impl ProductSource for FakeSource {
        async fn fetch_page(
            &self,
            cursor: Option<&str>,
            _group_id: Option<i64>,
        ) -> Result<ProductPage, UpstreamError> {
            if cursor.is_none() {
                self.sequences.fetch_add(1, Ordering::SeqCst);
            }
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(UpstreamError::Transient("scripted failure".into()));
            }
            Ok(ProductPage {
                products: self.products.clone(),
                last_id: None,
            })
        }

        async fn fetch_by_id(&self, _id: &str) -> Result<Product, UpstreamError> {
            Err(UpstreamError::NotFound)
        }

        async fn probe(&self) -> Result<Option<Product>, UpstreamError> {
            if self.fail {
                return Err(UpstreamError::Transient("scripted failure".into()));
            }
            Ok(self.products.first().cloned())
        }
    }

    fn scheduler(source: Arc<FakeSource>) -> (Arc<RefreshScheduler>, Arc<CacheStore>) {
        let cache = Arc::new(CacheStore::new(
            Duration::from_secs(600),
            default_category_map(),
        ));
        let fetcher = CatalogFetcher::new(
            source.clone(),
            FetchConfig {
                max_requests: 10,
                page_delay: Duration::from_millis(0),
            },
        );
        let sched = Arc::new(RefreshScheduler::new(
            cache.clone(),
            fetcher,
            source,
            SchedulerConfig::default(),
        ));
        (sched, cache)
    }

    #[tokio::test]
    async fn force_refresh_populates_the_cache() {
        // 250 products, two of them solar panels.
        let mut products: Vec<Product> = (0..248).map(|i| product(i, None)).collect();
        products.push(product(900, Some(97668952)));
        products.push(product(901, Some(97668952)));
        let source = Arc::new(FakeSource::new(products));
        let (sched, cache) = scheduler(source);

        let outcome = sched.force_refresh().await.unwrap();
        assert_eq!(outcome, RefreshOutcome::Completed { total: 250 });

        let status = cache.status();
        assert_eq!(status.total_products, 250);
        assert_eq!(status.categories["solar-panels"], 2);
        assert!(!status.is_updating);
        assert!(!status.is_stale);
        assert!(status.last_update.is_some());
    }

    #[tokio::test]
    async fn concurrent_force_refresh_runs_exactly_one_fetch() {
        let source = Arc::new(
            FakeSource::new(vec![product(1, None)]).slow(Duration::from_millis(100)),
        );
        let (sched, _cache) = scheduler(source.clone());

        let (a, b) = tokio::join!(sched.force_refresh(), sched.force_refresh());
        let outcomes = [a.unwrap(), b.unwrap()];
        assert!(outcomes.contains(&RefreshOutcome::AlreadyRunning));
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, RefreshOutcome::Completed { .. })));
        assert_eq!(source.sequences.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_refresh_retains_previous_snapshot_and_clears_flag() {
        let good = Arc::new(FakeSource::new(vec![product(1, None)]));
        let (sched, cache) = scheduler(good);
        sched.force_refresh().await.unwrap();
        let stamped = cache.snapshot().last_update;

        let bad = Arc::new(FakeSource::new(vec![]).failing());
        let failing = Arc::new(RefreshScheduler::new(
            cache.clone(),
            CatalogFetcher::new(
                bad.clone(),
                FetchConfig {
                    max_requests: 10,
                    page_delay: Duration::from_millis(0),
                },
            ),
            bad,
            SchedulerConfig::default(),
        ));
        assert!(failing.force_refresh().await.is_err());
        assert!(!cache.is_updating());
        assert_eq!(cache.get_all().len(), 1);
        assert_eq!(cache.snapshot().last_update, stamped);
    }

    #[tokio::test]
    async fn failed_refresh_on_empty_cache_leaves_it_empty_and_idle() {
        let bad = Arc::new(FakeSource::new(vec![]).failing());
        let (sched, cache) = {
            let cache = Arc::new(CacheStore::new(
                Duration::from_secs(600),
                default_category_map(),
            ));
            let fetcher = CatalogFetcher::new(
                bad.clone(),
                FetchConfig {
                    max_requests: 10,
                    page_delay: Duration::from_millis(0),
                },
            );
            (
                Arc::new(RefreshScheduler::new(
                    cache.clone(),
                    fetcher,
                    bad,
                    SchedulerConfig::default(),
                )),
                cache,
            )
        };
        assert!(sched.force_refresh().await.is_err());
        assert!(cache.is_empty());
        assert!(!cache.is_updating());
    }

    #[tokio::test]
    async fn maybe_refresh_is_a_noop_while_fresh() {
        let source = Arc::new(FakeSource::new(vec![product(1, None)]));
        let (sched, _cache) = scheduler(source.clone());
        sched.force_refresh().await.unwrap();
        sched.maybe_refresh().await;
        assert_eq!(source.sequences.load(Ordering::SeqCst), 1);
    }
}
