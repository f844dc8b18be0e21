//! TTL cache for normalized datasets, keyed by spreadsheet id.
//!
//! At most one fetch per key is in flight: concurrent callers for the same
//! key queue on a per-key async lock and reuse the outcome of the fetch they
//! waited on, the stored dataset or the same error. Invalidation bumps a
//! per-key generation so a fetch that was already running when the cache
//! was cleared does not repopulate it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

use crate::dataset::Dataset;
use crate::error::PipelineError;

// ============================================================================
// Clock
// ============================================================================

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let delta = TimeDelta::from_std(by).unwrap_or(TimeDelta::MAX);
        let mut now = self.now.lock();
        *now = now.checked_add_signed(delta).unwrap_or(*now);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

// ============================================================================
// Cache
// ============================================================================

#[derive(Debug, Clone)]
struct CacheEntry {
    dataset: Dataset,
    fetched_at: DateTime<Utc>,
}

struct Slot<E> {
    fetch_lock: tokio::sync::Mutex<()>,
    entry: Mutex<Option<CacheEntry>>,
    generation: AtomicU64,
    // Completed fetches, and the error of the latest one if it failed.
    attempts: AtomicU64,
    last_failure: Mutex<Option<E>>,
}

impl<E> Default for Slot<E> {
    fn default() -> Self {
        Self {
            fetch_lock: tokio::sync::Mutex::new(()),
            entry: Mutex::new(None),
            generation: AtomicU64::new(0),
            attempts: AtomicU64::new(0),
            last_failure: Mutex::new(None),
        }
    }
}

impl<E> Slot<E> {
    fn fresh(&self, now: DateTime<Utc>, ttl: TimeDelta) -> Option<Dataset> {
        self.entry
            .lock()
            .as_ref()
            .filter(|e| now.signed_duration_since(e.fetched_at) < ttl)
            .map(|e| e.dataset.clone())
    }

    fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.entry.lock() = None;
    }
}

/// Dataset cache; `E` is the fetch error handed to callers that queued
/// behind a failed fetch.
pub struct DatasetCache<E = PipelineError> {
    slots: Mutex<HashMap<String, Arc<Slot<E>>>>,
    clock: Arc<dyn Clock>,
}

impl<E> Default for DatasetCache<E> {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl<E> DatasetCache<E> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn slot(&self, key: &str) -> Arc<Slot<E>> {
        self.slots
            .lock()
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    pub fn invalidate(&self, key: &str) {
        let slot = self.slots.lock().get(key).cloned();
        if let Some(slot) = slot {
            slot.invalidate();
        }
    }

    pub fn clear(&self) {
        let slots: Vec<Arc<Slot<E>>> = self.slots.lock().values().cloned().collect();
        for slot in slots {
            slot.invalidate();
        }
    }

    /// When the cached dataset for `key` was fetched, if one is held.
    pub fn fetched_at(&self, key: &str) -> Option<DateTime<Utc>> {
        let slot = self.slots.lock().get(key).cloned()?;
        let fetched_at = slot.entry.lock().as_ref().map(|e| e.fetched_at);
        fetched_at
    }
}

impl<E: Clone> DatasetCache<E> {
    /// Cached dataset for `key` if younger than `ttl`, otherwise run `fetch`.
    ///
    /// Only successful fetches are stored. Callers that queued behind a
    /// failed fetch get its error without fetching again. A zero `ttl`
    /// disables caching.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<Dataset, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Dataset, E>>,
    {
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        let slot = self.slot(key);

        if let Some(dataset) = slot.fresh(self.clock.now(), ttl) {
            log::debug!("cache: hit for {}", key);
            return Ok(dataset);
        }

        let attempts_seen = slot.attempts.load(Ordering::SeqCst);
        let _guard = slot.fetch_lock.lock().await;

        // Another caller may have filled the slot while we waited.
        if let Some(dataset) = slot.fresh(self.clock.now(), ttl) {
            log::debug!("cache: filled by concurrent fetch for {}", key);
            return Ok(dataset);
        }

        // Or its fetch failed while we waited: share that outcome.
        if slot.attempts.load(Ordering::SeqCst) != attempts_seen {
            if let Some(err) = slot.last_failure.lock().clone() {
                log::debug!("cache: concurrent fetch for {} failed, not retrying", key);
                return Err(err);
            }
        }

        let generation = slot.generation.load(Ordering::SeqCst);
        log::debug!("cache: miss for {}, fetching", key);
        let result = fetch().await;

        match &result {
            Ok(dataset) => {
                *slot.last_failure.lock() = None;
                if slot.generation.load(Ordering::SeqCst) == generation {
                    *slot.entry.lock() = Some(CacheEntry {
                        dataset: dataset.clone(),
                        fetched_at: self.clock.now(),
                    });
                } else {
                    log::debug!("cache: {} invalidated during fetch, not storing", key);
                }
            }
            Err(err) => *slot.last_failure.lock() = Some(err.clone()),
        }
        slot.attempts.fetch_add(1, Ordering::SeqCst);

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Record;
    use std::sync::atomic::AtomicUsize;

    const TTL: Duration = Duration::from_secs(60);

    fn dataset(n: usize) -> Dataset {
        Dataset::new(vec!["Name".to_string()], vec![Record::default(); n])
    }

    struct Harness {
        clock: Arc<ManualClock>,
        cache: DatasetCache<String>,
        calls: AtomicUsize,
    }

    impl Harness {
        fn new() -> Self {
            let clock = Arc::new(ManualClock::default());
            Self {
                cache: DatasetCache::new(clock.clone()),
                clock,
                calls: AtomicUsize::new(0),
            }
        }

        async fn load(&self, key: &str) -> Result<Dataset, String> {
            self.cache
                .get_or_fetch(key, TTL, || async {
                    let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok(dataset(n))
                })
                .await
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_hit_within_ttl() {
        let h = Harness::new();
        let first = h.load("sheet").await.unwrap();
        h.clock.advance(Duration::from_secs(59));
        let second = h.load("sheet").await.unwrap();
        assert_eq!(h.calls(), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_refetch_after_ttl() {
        let h = Harness::new();
        h.load("sheet").await.unwrap();
        h.clock.advance(TTL);
        let reloaded = h.load("sheet").await.unwrap();
        assert_eq!(h.calls(), 2);
        assert_eq!(reloaded.len(), 2);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let h = Harness::new();
        h.load("a").await.unwrap();
        h.load("b").await.unwrap();
        h.load("a").await.unwrap();
        assert_eq!(h.calls(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let h = Harness::new();
        h.load("a").await.unwrap();
        h.load("b").await.unwrap();

        h.cache.invalidate("a");
        assert!(h.cache.fetched_at("a").is_none());
        assert!(h.cache.fetched_at("b").is_some());
        h.load("a").await.unwrap();
        assert_eq!(h.calls(), 3);

        h.cache.clear();
        h.load("a").await.unwrap();
        h.load("b").await.unwrap();
        assert_eq!(h.calls(), 5);
    }

    #[tokio::test]
    async fn test_failed_fetch_not_cached() {
        let h = Harness::new();
        let err: Result<Dataset, String> = h
            .cache
            .get_or_fetch("sheet", TTL, || async { Err("offline".to_string()) })
            .await;
        assert_eq!(err.unwrap_err(), "offline");
        assert!(h.cache.fetched_at("sheet").is_none());

        h.load("sheet").await.unwrap();
        assert_eq!(h.calls(), 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_always_fetches() {
        let h = Harness::new();
        for _ in 0..3 {
            h.cache
                .get_or_fetch("sheet", Duration::ZERO, || async {
                    h.calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(dataset(1))
                })
                .await
                .unwrap();
        }
        assert_eq!(h.calls(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_fetch() {
        let h = Harness::new();
        let slow = || async {
            h.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, String>(dataset(3))
        };
        let (a, b, c) = tokio::join!(
            h.cache.get_or_fetch("sheet", TTL, slow),
            h.cache.get_or_fetch("sheet", TTL, slow),
            h.cache.get_or_fetch("sheet", TTL, slow),
        );
        assert_eq!(h.calls(), 1);
        assert_eq!(a.unwrap().len(), 3);
        assert_eq!(b.unwrap().len(), 3);
        assert_eq!(c.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_failures_share_one_fetch() {
        let h = Harness::new();
        let unreachable = || async {
            h.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err::<Dataset, _>("unreachable".to_string())
        };
        let (a, b, c) = tokio::join!(
            h.cache.get_or_fetch("sheet", TTL, unreachable),
            h.cache.get_or_fetch("sheet", TTL, unreachable),
            h.cache.get_or_fetch("sheet", TTL, unreachable),
        );
        assert_eq!(h.calls(), 1);
        for result in [a, b, c] {
            assert_eq!(result.unwrap_err(), "unreachable");
        }

        // A later call is not a waiter and fetches again.
        h.load("sheet").await.unwrap();
        assert_eq!(h.calls(), 2);
    }

    #[tokio::test]
    async fn test_clear_during_fetch_discards_result() {
        let h = Harness::new();
        let result = h
            .cache
            .get_or_fetch("sheet", TTL, || async {
                h.cache.clear();
                Ok::<_, String>(dataset(1))
            })
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert!(h.cache.fetched_at("sheet").is_none());
    }
}
