//! Query Cache
//!
//! Keyed store for query results with:
//! - Staleness windows: a fresh entry is served without a request
//! - In-flight de-duplication: one fetch per key at a time, waiters reuse its
//!   result or its error
//! - Invalidation: entries are marked stale but stay readable until refetched;
//!   a fetch in flight during invalidation stores its result as stale
//! - Cancellation: results of in-flight fetches can be prevented from landing

use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::AuditLogQuery;
use crate::error::{Result, SettingsError};

/// Group of related keys, used for bulk invalidation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryScope {
    FeatureToggles,
    AuditLogs,
    EmailTemplates,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    FeatureToggles,
    FeatureToggle(String),
    AuditLogs(AuditLogQuery),
    EmailTemplates,
    EmailTemplate(String),
}

impl QueryKey {
    pub fn scope(&self) -> QueryScope {
        match self {
            QueryKey::FeatureToggles | QueryKey::FeatureToggle(_) => QueryScope::FeatureToggles,
            QueryKey::AuditLogs(_) => QueryScope::AuditLogs,
            QueryKey::EmailTemplates | QueryKey::EmailTemplate(_) => QueryScope::EmailTemplates,
        }
    }
}

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    updated_at: Instant,
    invalidated: bool,
}

impl CacheEntry {
    fn is_fresh(&self, stale_time: Duration) -> bool {
        !self.invalidated && self.updated_at.elapsed() < stale_time
    }
}

/// Error of the most recent fetch for a key
struct FailedFetch {
    attempt: u64,
    error: SettingsError,
}

/// Fetch coordination for one key, present while callers are using it
#[derive(Default)]
struct InFlight {
    /// Held for the duration of a fetch
    last_failure: Mutex<Option<FailedFetch>>,

    /// Number of fetches that have run to completion
    completed: AtomicU64,

    /// Bumped by `cancel_queries`; a fetch only stores if unchanged
    cancellations: AtomicU64,

    /// Bumped by invalidation; a fetch stores its result as stale if changed
    invalidations: AtomicU64,
}

#[derive(Default)]
pub struct QueryCache {
    entries: DashMap<QueryKey, CacheEntry>,
    flights: DashMap<QueryKey, Arc<InFlight>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key` while fresh, otherwise run `fetcher`.
    ///
    /// Concurrent calls for the same key wait for the fetch in progress and then
    /// reuse its result, or share its error. Errors are never cached beyond the
    /// callers that were waiting on the failed fetch.
    pub async fn fetch<T, F, Fut>(&self, key: QueryKey, stale_time: Duration, fetcher: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.fresh_value::<T>(&key, stale_time) {
            debug!(key = ?key, "Query cache hit");
            return Ok(value);
        }

        let flight = self
            .flights
            .entry(key.clone())
            .or_insert_with(|| Arc::new(InFlight::default()))
            .clone();

        let result = self.fetch_in_flight(&key, stale_time, &flight, fetcher).await;

        drop(flight);
        self.flights.remove_if(&key, |_, flight| Arc::strong_count(flight) == 1);

        result
    }

    async fn fetch_in_flight<T, F, Fut>(
        &self,
        key: &QueryKey,
        stale_time: Duration,
        flight: &InFlight,
        fetcher: F,
    ) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let seen = flight.completed.load(Ordering::Acquire);
        let mut last_failure = flight.last_failure.lock().await;

        // A concurrent fetch may have completed while we waited
        if let Some(value) = self.fresh_value::<T>(key, stale_time) {
            debug!(key = ?key, "Query resolved by concurrent fetch");
            return Ok(value);
        }
        if let Some(failed) = last_failure.as_ref().filter(|f| f.attempt > seen) {
            debug!(key = ?key, "Query failed in concurrent fetch");
            return Err(failed.error.share());
        }

        let attempt = flight.completed.load(Ordering::Acquire) + 1;
        let cancellations = flight.cancellations.load(Ordering::Acquire);
        let invalidations = flight.invalidations.load(Ordering::Acquire);

        debug!(key = ?key, "Query cache miss, fetching");
        let outcome = fetcher().await;
        flight.completed.store(attempt, Ordering::Release);

        match outcome {
            Ok(value) => {
                *last_failure = None;
                if flight.cancellations.load(Ordering::Acquire) != cancellations {
                    debug!(key = ?key, "Query was cancelled, discarding result");
                } else {
                    let stale = flight.invalidations.load(Ordering::Acquire) != invalidations;
                    if stale {
                        debug!(key = ?key, "Query invalidated during fetch, storing as stale");
                    }
                    self.store(key.clone(), value.clone(), stale);
                }
                Ok(value)
            }
            Err(e) => {
                *last_failure = Some(FailedFetch {
                    attempt,
                    error: e.share(),
                });
                Err(e)
            }
        }
    }

    /// Cached value regardless of staleness.
    pub fn get_query_data<T: Clone + 'static>(&self, key: &QueryKey) -> Option<T> {
        self.entries
            .get(key)
            .and_then(|entry| entry.value.downcast_ref::<T>().cloned())
    }

    pub fn set_query_data<T: Send + Sync + 'static>(&self, key: QueryKey, value: T) {
        self.store(key, value, false);
    }

    pub fn is_fresh(&self, key: &QueryKey, stale_time: Duration) -> bool {
        self.entries
            .get(key)
            .map(|entry| entry.is_fresh(stale_time))
            .unwrap_or(false)
    }

    /// Mark one entry stale. Returns whether it existed.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        if let Some(flight) = self.flights.get(key) {
            flight.invalidations.fetch_add(1, Ordering::AcqRel);
        }

        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.invalidated = true;
                true
            }
            None => false,
        }
    }

    /// Mark every entry in `scope` stale. Returns how many were marked.
    pub fn invalidate_scope(&self, scope: QueryScope) -> usize {
        for flight in self.flights.iter() {
            if flight.key().scope() == scope {
                flight.invalidations.fetch_add(1, Ordering::AcqRel);
            }
        }

        let mut count = 0;
        for mut entry in self.entries.iter_mut() {
            if entry.key().scope() == scope {
                entry.invalidated = true;
                count += 1;
            }
        }
        debug!(scope = ?scope, count, "Invalidated queries");
        count
    }

    /// Keep fetches currently in flight for `key` from writing their result.
    pub fn cancel_queries(&self, key: &QueryKey) {
        if let Some(flight) = self.flights.get(key) {
            flight.cancellations.fetch_add(1, Ordering::AcqRel);
        }
    }

    pub fn remove(&self, key: &QueryKey) -> bool {
        self.flights.remove_if(key, |_, flight| Arc::strong_count(flight) == 1);
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.flights.retain(|_, flight| Arc::strong_count(flight) > 1);
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn store<T: Send + Sync + 'static>(&self, key: QueryKey, value: T, invalidated: bool) {
        self.entries.insert(
            key,
            CacheEntry {
                value: Arc::new(value),
                updated_at: Instant::now(),
                invalidated,
            },
        );
    }

    fn fresh_value<T: Clone + 'static>(&self, key: &QueryKey, stale_time: Duration) -> Option<T> {
        let entry = self.entries.get(key)?;
        if !entry.is_fresh(stale_time) {
            return None;
        }
        entry.value.downcast_ref::<T>().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const STALE: Duration = Duration::from_secs(30);

    async fn counted(counter: &AtomicUsize, value: u32) -> Result<u32> {
        counter.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(value)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_entry_served_from_cache() {
        let cache = QueryCache::new();
        let calls = AtomicUsize::new(0);

        let first = cache.fetch(QueryKey::FeatureToggles, STALE, || counted(&calls, 1)).await.unwrap();
        let second = cache.fetch(QueryKey::FeatureToggles, STALE, || counted(&calls, 2)).await.unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_refetched() {
        let cache = QueryCache::new();
        let calls = AtomicUsize::new(0);

        cache.fetch(QueryKey::EmailTemplates, STALE, || counted(&calls, 1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;
        let value = cache.fetch(QueryKey::EmailTemplates, STALE, || counted(&calls, 2)).await.unwrap();

        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_fetches_are_deduplicated() {
        let cache = QueryCache::new();
        let calls = AtomicUsize::new(0);

        let (a, b) = tokio::join!(
            cache.fetch(QueryKey::FeatureToggles, STALE, || counted(&calls, 7)),
            cache.fetch(QueryKey::FeatureToggles, STALE, || counted(&calls, 8)),
        );

        assert_eq!(a.unwrap(), 7);
        assert_eq!(b.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_keeps_data_but_forces_refetch() {
        let cache = QueryCache::new();
        let calls = AtomicUsize::new(0);

        cache.fetch(QueryKey::FeatureToggles, STALE, || counted(&calls, 1)).await.unwrap();
        assert!(cache.invalidate(&QueryKey::FeatureToggles));
        assert!(!cache.is_fresh(&QueryKey::FeatureToggles, STALE));
        assert_eq!(cache.get_query_data::<u32>(&QueryKey::FeatureToggles), Some(1));

        let value = cache.fetch(QueryKey::FeatureToggles, STALE, || counted(&calls, 2)).await.unwrap();
        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_scope() {
        let cache = QueryCache::new();
        cache.set_query_data(QueryKey::EmailTemplates, 1u32);
        cache.set_query_data(QueryKey::EmailTemplate("welcome".into()), 2u32);
        cache.set_query_data(QueryKey::FeatureToggles, 3u32);

        assert_eq!(cache.invalidate_scope(QueryScope::EmailTemplates), 2);
        assert!(!cache.is_fresh(&QueryKey::EmailTemplates, STALE));
        assert!(cache.is_fresh(&QueryKey::FeatureToggles, STALE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_fetch_does_not_overwrite() {
        let cache = QueryCache::new();
        let calls = AtomicUsize::new(0);

        let fetch = cache.fetch(QueryKey::FeatureToggles, STALE, || counted(&calls, 1));
        let cancel = async {
            tokio::task::yield_now().await;
            cache.cancel_queries(&QueryKey::FeatureToggles);
            cache.set_query_data(QueryKey::FeatureToggles, 99u32);
        };
        let (result, ()) = tokio::join!(fetch, cancel);

        assert_eq!(result.unwrap(), 1);
        assert_eq!(cache.get_query_data::<u32>(&QueryKey::FeatureToggles), Some(99));
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = QueryCache::new();

        let result: Result<u32> = cache
            .fetch(QueryKey::FeatureToggles, STALE, || async {
                Err(SettingsError::status(500, "boom"))
            })
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    async fn failing(counter: &AtomicUsize) -> Result<u32> {
        counter.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Err(SettingsError::status(500, "boom"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_failures_share_one_request() {
        let cache = QueryCache::new();
        let calls = AtomicUsize::new(0);

        let (a, b, c) = tokio::join!(
            cache.fetch(QueryKey::EmailTemplates, STALE, || failing(&calls)),
            cache.fetch(QueryKey::EmailTemplates, STALE, || failing(&calls)),
            cache.fetch(QueryKey::EmailTemplates, STALE, || failing(&calls)),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in [a, b, c] {
            assert_eq!(result.unwrap_err().status_code(), Some(500));
        }

        // A later call is not served the old error
        let value = cache.fetch(QueryKey::EmailTemplates, STALE, || counted(&calls, 4)).await.unwrap();
        assert_eq!(value, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidation_during_fetch_stores_stale() {
        let cache = QueryCache::new();
        let calls = AtomicUsize::new(0);

        let fetch = cache.fetch(QueryKey::FeatureToggles, STALE, || counted(&calls, 1));
        let invalidate = async {
            tokio::task::yield_now().await;
            cache.invalidate_scope(QueryScope::FeatureToggles);
        };
        let (result, ()) = tokio::join!(fetch, invalidate);

        assert_eq!(result.unwrap(), 1);
        assert_eq!(cache.get_query_data::<u32>(&QueryKey::FeatureToggles), Some(1));
        assert!(!cache.is_fresh(&QueryKey::FeatureToggles, STALE));

        let value = cache.fetch(QueryKey::FeatureToggles, STALE, || counted(&calls, 2)).await.unwrap();
        assert_eq!(value, 2);
        assert!(cache.is_fresh(&QueryKey::FeatureToggles, STALE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_bookkeeping_is_released() {
        let cache = QueryCache::new();
        let calls = AtomicUsize::new(0);

        for page in 0..5 {
            let key = QueryKey::AuditLogs(AuditLogQuery::default().with_page(page));
            cache.fetch(key, STALE, || counted(&calls, page)).await.unwrap();
        }
        let _ = cache.fetch(QueryKey::FeatureToggles, STALE, || failing(&calls)).await;
        cache.cancel_queries(&QueryKey::EmailTemplates);

        assert!(cache.flights.is_empty());
        assert_eq!(cache.len(), 5);

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.flights.is_empty());
    }

    #[test]
    fn test_type_mismatch_reads_as_missing() {
        let cache = QueryCache::new();
        cache.set_query_data(QueryKey::FeatureToggles, "text".to_string());
        assert_eq!(cache.get_query_data::<u32>(&QueryKey::FeatureToggles), None);
    }

    #[test]
    fn test_key_scopes() {
        assert_eq!(QueryKey::FeatureToggle("x".into()).scope(), QueryScope::FeatureToggles);
        assert_eq!(
            QueryKey::AuditLogs(AuditLogQuery::default()).scope(),
            QueryScope::AuditLogs
        );
        assert_eq!(QueryKey::EmailTemplate("x".into()).scope(), QueryScope::EmailTemplates);
    }
}
