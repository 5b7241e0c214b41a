use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::categorize::{categorize, CategoryMap};
use crate::catalog::product::Product;

/// One internally consistent view of the catalog: the full product list plus
/// its category partition, stamped with the refresh time. Snapshots are
/// immutable once published; a refresh builds a new one and swaps the `Arc`.
#[derive(Debug)]
pub struct CacheSnapshot {
    pub all: Vec<Product>,
    pub by_category: IndexMap<String, Vec<Product>>,
    pub last_update: Option<DateTime<Utc>>,
}

impl CacheSnapshot {
    fn empty(categories: &CategoryMap) -> Self {
        Self {
            all: Vec::new(),
            by_category: categories.keys().map(|k| (k.clone(), Vec::new())).collect(),
            last_update: None,
        }
    }
}

/// Lifecycle of the cached snapshot. `Updating` is reported while a refresh
/// is in flight regardless of what is currently servable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Empty,
    Fresh,
    Stale,
    Updating,
}

#[derive(Debug, Serialize)]
pub struct CacheStatus {
    pub total_products: usize,
    pub last_update: Option<DateTime<Utc>>,
    pub age_minutes: Option<i64>,
    pub is_stale: bool,
    pub is_updating: bool,
    pub categories: IndexMap<String, usize>,
}

/// In-process product cache. Readers clone the current snapshot `Arc` under
/// a short read lock; a refresh publishes a fully built replacement in one
/// write, so concurrent readers see either the old or the new snapshot,
/// never a mix. The `updating` flag doubles as the single-flight gate.
pub struct CacheStore {
    snapshot: RwLock<Arc<CacheSnapshot>>,
    updating: AtomicBool,
    ttl: chrono::Duration,
    categories: CategoryMap,
}

impl CacheStore {
    pub fn new(ttl: Duration, categories: CategoryMap) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(CacheSnapshot::empty(&categories))),
            updating: AtomicBool::new(false),
            ttl: chrono::Duration::seconds(ttl.as_secs() as i64),
            categories,
        }
    }

    /// Current snapshot, shared. Callers that page through results must hold
    /// on to this one `Arc` for the whole computation so a concurrent swap
    /// cannot split their view.
    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.snapshot.read().unwrap().clone()
    }

    pub fn category_map(&self) -> &CategoryMap {
        &self.categories
    }

    pub fn category_exists(&self, key: &str) -> bool {
        self.categories.contains_key(key)
    }

    pub fn category_keys(&self) -> Vec<String> {
        self.categories.keys().cloned().collect()
    }

    /// True if no refresh ever completed or the snapshot outlived its TTL.
    /// Staleness is evaluated lazily on read; there is no timer flipping
    /// state behind the scenes.
    pub fn is_stale(&self) -> bool {
        match self.snapshot().last_update {
            None => true,
            Some(ts) => Utc::now().signed_duration_since(ts) > self.ttl,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().last_update.is_none()
    }

    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::SeqCst)
    }

    /// Atomically claim the updating flag. Returns false if a refresh is
    /// already in flight; the caller must not proceed in that case.
    pub fn try_begin_update(&self) -> bool {
        self.updating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn finish_update(&self) {
        self.updating.store(false, Ordering::SeqCst);
    }

    pub fn state(&self) -> CacheState {
        if self.is_updating() {
            CacheState::Updating
        } else if self.is_empty() {
            CacheState::Empty
        } else if self.is_stale() {
            CacheState::Stale
        } else {
            CacheState::Fresh
        }
    }

    /// Publish a new snapshot: categorize, stamp, swap. The categorization
    /// happens outside the lock; the write section is only the pointer swap.
    pub fn replace_snapshot(&self, products: Vec<Product>) {
        if products.is_empty() {
            warn!("replacing cache snapshot with an empty product list");
        }
        let by_category = categorize(&products, &self.categories);
        let populated: Vec<String> = by_category
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| format!("{k}: {}", v.len()))
            .collect();
        info!(
            total = products.len(),
            categories = %populated.join(", "),
            "cache snapshot replaced"
        );

        let next = Arc::new(CacheSnapshot {
            all: products,
            by_category,
            last_update: Some(Utc::now()),
        });
        *self.snapshot.write().unwrap() = next;
    }

    /// Drop the snapshot back to the empty state. The next read sees an
    /// EMPTY cache; a subsequent refresh repopulates it.
    pub fn clear(&self) {
        warn!("clearing product cache");
        *self.snapshot.write().unwrap() = Arc::new(CacheSnapshot::empty(&self.categories));
    }

    /// Defensive copy of the full product list.
    pub fn get_all(&self) -> Vec<Product> {
        self.snapshot().all.clone()
    }

    /// Defensive copy of one category; empty if the key is unknown.
    pub fn get_category(&self, key: &str) -> Vec<Product> {
        self.snapshot()
            .by_category
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn find_by_id(&self, id: &str) -> Option<Product> {
        self.snapshot()
            .all
            .iter()
            .find(|p| p.id_key() == id)
            .cloned()
    }

    /// Suspend until the in-flight refresh finishes or `timeout` elapses,
    /// polling every 100ms. Returns true if the update completed in time.
    pub async fn wait_for_update_completion(&self, timeout: Duration) -> bool {
        let started = tokio::time::Instant::now();
        while self.is_updating() {
            if started.elapsed() >= timeout {
                warn!(timeout_ms = timeout.as_millis() as u64, "gave up waiting for cache update");
                return false;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        true
    }

    pub fn status(&self) -> CacheStatus {
        let snap = self.snapshot();
        let age_minutes = snap
            .last_update
            .map(|ts| Utc::now().signed_duration_since(ts).num_minutes());
        CacheStatus {
            total_products: snap.all.len(),
            last_update: snap.last_update,
            age_minutes,
            is_stale: self.is_stale(),
            is_updating: self.is_updating(),
            categories: snap
                .by_category
                .iter()
                .map(|(k, v)| (k.clone(), v.len()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::categorize::default_category_map;
    use serde_json::json;

    fn product(id: i64, group: Option<i64>) -> Product {
        let value = match group {
            Some(g) => json!({"id": id, "group": {"id": g}}),
            None => json!({"id": id}),
        };
        serde_json::from_value(value).unwrap()
    }

    fn store(ttl: Duration) -> CacheStore {
        CacheStore::new(ttl, default_category_map())
    }

    #[test]
    fn starts_empty_and_stale() {
        let store = store(Duration::from_secs(60));
        assert!(store.is_empty());
        assert!(store.is_stale());
        assert_eq!(store.state(), CacheState::Empty);
        assert_eq!(store.status().total_products, 0);
        assert_eq!(store.status().last_update, None);
    }

    #[test]
    fn replace_makes_it_fresh_and_queryable() {
        let store = store(Duration::from_secs(60));
        store.replace_snapshot(vec![
            product(1, Some(97668952)),
            product(2, Some(97668952)),
            product(3, None),
        ]);
        assert!(!store.is_stale());
        assert_eq!(store.state(), CacheState::Fresh);
        assert_eq!(store.get_all().len(), 3);
        assert_eq!(store.get_category("solar-panels").len(), 2);
        assert_eq!(store.get_category("no-such-key").len(), 0);
        assert!(store.find_by_id("2").is_some());
        assert!(store.find_by_id("99").is_none());
    }

    #[test]
    fn zero_ttl_snapshot_is_immediately_stale_but_servable() {
        let store = store(Duration::from_secs(0));
        store.replace_snapshot(vec![product(1, None)]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(store.is_stale());
        assert_eq!(store.state(), CacheState::Stale);
        assert_eq!(store.get_all().len(), 1);
    }

    #[test]
    fn single_flight_gate_admits_exactly_one() {
        let store = store(Duration::from_secs(60));
        assert!(store.try_begin_update());
        assert!(!store.try_begin_update());
        assert_eq!(store.state(), CacheState::Updating);
        store.finish_update();
        assert!(store.try_begin_update());
        store.finish_update();
    }

    #[test]
    fn clear_resets_to_empty() {
        let store = store(Duration::from_secs(60));
        store.replace_snapshot(vec![product(1, None)]);
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.get_all().len(), 0);
        // Category keys survive a clear; their partitions are empty.
        assert_eq!(store.status().categories.len(), default_category_map().len());
    }

    #[test]
    fn readers_holding_a_snapshot_see_old_or_new_never_a_mix() {
        let store = store(Duration::from_secs(60));
        store.replace_snapshot(vec![product(1, Some(97668952)), product(2, None)]);

        let held = store.snapshot();
        store.replace_snapshot(vec![product(10, None)]);

        // The held view is still the complete old snapshot.
        assert_eq!(held.all.len(), 2);
        assert_eq!(held.by_category["solar-panels"].len(), 1);
        // A fresh read sees the complete new one.
        let now = store.snapshot();
        assert_eq!(now.all.len(), 1);
        assert!(now.by_category["solar-panels"].is_empty());
    }

    #[tokio::test]
    async fn wait_for_update_returns_once_flag_clears() {
        let store = Arc::new(store(Duration::from_secs(60)));
        assert!(store.try_begin_update());

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.wait_for_update_completion(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(150)).await;
        store.finish_update();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn wait_for_update_times_out() {
        let store = store(Duration::from_secs(60));
        assert!(store.try_begin_update());
        let completed = store
            .wait_for_update_completion(Duration::from_millis(250))
            .await;
        assert!(!completed);
        store.finish_update();
    }

    #[test]
    fn find_by_id_matches_string_and_numeric_ids() {
        let store = store(Duration::from_secs(60));
        let mixed: Product = serde_json::from_value(json!({"id": "abc-7"})).unwrap();
        store.replace_snapshot(vec![product(5, None), mixed]);
        assert!(store.find_by_id("5").is_some());
        assert!(store.find_by_id("abc-7").is_some());
    }
}
