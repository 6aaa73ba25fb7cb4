//! # Cache Store
//!
//! TTL-keyed memoization of pull reads.
//!
//! ## Guarantees
//!
//! - At most one outstanding fetch per key; concurrent readers join it.
//! - A failed fetch is never cached and leaves any stale entry in place.
//! - `invalidate` detaches in-flight fetches: their results still reach the
//!   callers already waiting, but are not stored.
//!
//! Fetches run on their own task bounded by `fetch_timeout`, so a caller
//! that stops waiting does not cancel the fetch for the others.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use pulse_telemetry::metrics::{CACHE_LOOKUPS, FETCH_DURATION, FETCH_FAILURES};
use pulse_telemetry::HistogramTimer;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::FetchError;

type SharedFetch<V> = Shared<BoxFuture<'static, Result<V, FetchError>>>;

struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
    last_access: Instant,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) < self.ttl
    }
}

struct InFlight<V> {
    id: u64,
    fetch: SharedFetch<V>,
}

struct Inner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    in_flight: HashMap<K, InFlight<V>>,
    next_fetch_id: u64,
    fetch_timeout: Duration,
    max_entries: Option<usize>,
}

/// Cache statistics for monitoring.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    joins: AtomicU64,
    fetches: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    evictions: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub joins: u64,
    pub fetches: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            joins: self.joins.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// TTL cache with in-flight de-duplication. Cheap to clone; clones share
/// state.
pub struct CacheStore<K, V> {
    inner: Arc<Mutex<Inner<K, V>>>,
    stats: Arc<CacheStats>,
}

impl<K, V> Clone for CacheStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            stats: self.stats.clone(),
        }
    }
}

impl<K, V> CacheStore<K, V>
where
    K: Eq + Hash + Clone + fmt::Display + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(fetch_timeout: Duration, max_entries: Option<usize>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
                next_fetch_id: 1,
                fetch_timeout,
                max_entries,
            })),
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// Return a fresh cached value, join the in-flight fetch, or start one.
    ///
    /// `fetcher` is only called when a new fetch starts; it should just build
    /// the future.
    pub async fn get<F, Fut>(&self, key: K, ttl: Duration, fetcher: F) -> Result<V, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        let fetch = {
            let mut inner = self.inner.lock();
            let now = Instant::now();
            if let Some(entry) = inner.entries.get_mut(&key) {
                if entry.is_fresh(now) {
                    entry.last_access = now;
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    CACHE_LOOKUPS.with_label_values(&["hit"]).inc();
                    debug!(key = %key, "Cache hit");
                    return Ok(entry.value.clone());
                }
            }

            match inner.in_flight.get(&key) {
                Some(in_flight) => self.join(&key, in_flight),
                None => {
                    self.stats.misses.fetch_add(1, Ordering::Relaxed);
                    CACHE_LOOKUPS.with_label_values(&["miss"]).inc();
                    self.start_fetch(&mut inner, key, ttl, fetcher())
                }
            }
        };

        fetch.await
    }

    /// Fetch regardless of freshness and overwrite on success. Joins an
    /// already in-flight fetch for the key.
    pub async fn bypass<F, Fut>(&self, key: K, ttl: Duration, fetcher: F) -> Result<V, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        let fetch = {
            let mut inner = self.inner.lock();
            match inner.in_flight.get(&key) {
                Some(in_flight) => self.join(&key, in_flight),
                None => self.start_fetch(&mut inner, key, ttl, fetcher()),
            }
        };

        fetch.await
    }

    /// Drop the entry for `key` and detach its in-flight fetch.
    pub fn invalidate(&self, key: &K) -> bool {
        let mut inner = self.inner.lock();
        let removed = inner.entries.remove(key).is_some();
        let detached = inner.in_flight.remove(key).is_some();
        if removed || detached {
            debug!(key = %key, removed, detached, "Cache entry invalidated");
        }
        removed || detached
    }

    /// Invalidate every key matching `predicate`. Returns the number of keys
    /// affected.
    pub fn invalidate_where<P>(&self, mut predicate: P) -> usize
    where
        P: FnMut(&K) -> bool,
    {
        let mut inner = self.inner.lock();
        let before = inner.entries.len() + inner.in_flight.len();
        inner.entries.retain(|key, _| !predicate(key));
        inner.in_flight.retain(|key, _| !predicate(key));
        before - (inner.entries.len() + inner.in_flight.len())
    }

    /// Drop everything.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.in_flight.clear();
    }

    /// Last-known-good value and whether it is still fresh.
    pub fn peek(&self, key: &K) -> Option<(V, bool)> {
        let inner = self.inner.lock();
        inner
            .entries
            .get(key)
            .map(|entry| (entry.value.clone(), entry.is_fresh(Instant::now())))
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.inner.lock().in_flight.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<K> {
        self.inner.lock().entries.keys().cloned().collect()
    }

    /// Applies to fetches started afterwards.
    pub fn set_fetch_timeout(&self, fetch_timeout: Duration) {
        self.inner.lock().fetch_timeout = fetch_timeout;
    }

    /// Shrinking evicts least recently used entries immediately.
    pub fn set_max_entries(&self, max_entries: Option<usize>) {
        let mut inner = self.inner.lock();
        inner.max_entries = max_entries;
        if let Some(max) = max_entries {
            while inner.entries.len() > max {
                if !self.evict_lru(&mut inner) {
                    break;
                }
            }
        }
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    fn join(&self, key: &K, in_flight: &InFlight<V>) -> SharedFetch<V> {
        self.stats.joins.fetch_add(1, Ordering::Relaxed);
        CACHE_LOOKUPS.with_label_values(&["join"]).inc();
        debug!(key = %key, fetch_id = in_flight.id, "Joining in-flight fetch");
        in_flight.fetch.clone()
    }

    /// Spawn the fetch and register it. Called with the lock held so the
    /// task cannot complete before its marker exists.
    fn start_fetch<Fut>(
        &self,
        inner: &mut Inner<K, V>,
        key: K,
        ttl: Duration,
        fetch: Fut,
    ) -> SharedFetch<V>
    where
        Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        let id = inner.next_fetch_id;
        inner.next_fetch_id += 1;
        let fetch_timeout = inner.fetch_timeout;
        self.stats.fetches.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, fetch_id = id, "Starting fetch");

        let store = self.clone();
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            let result = {
                let _timer = HistogramTimer::new(&FETCH_DURATION);
                match tokio::time::timeout(fetch_timeout, fetch).await {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::Timeout(fetch_timeout)),
                }
            };
            store.complete(&task_key, id, ttl, &result);
            result
        });

        let fetch = async move {
            task.await
                .unwrap_or_else(|e| Err(FetchError::Aborted(e.to_string())))
        }
        .boxed()
        .shared();

        inner.in_flight.insert(
            key,
            InFlight {
                id,
                fetch: fetch.clone(),
            },
        );
        fetch
    }

    fn complete(&self, key: &K, id: u64, ttl: Duration, result: &Result<V, FetchError>) {
        if let Err(err) = result {
            self.stats.failures.fetch_add(1, Ordering::Relaxed);
            if matches!(err, FetchError::Timeout(_)) {
                self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
            }
            FETCH_FAILURES.with_label_values(&[err.reason()]).inc();
            warn!(key = %key, fetch_id = id, error = %err, "Fetch failed");
        }

        let mut inner = self.inner.lock();
        let current = inner.in_flight.get(key).map(|in_flight| in_flight.id) == Some(id);
        if !current {
            debug!(key = %key, fetch_id = id, "Detached fetch finished, result not stored");
            return;
        }
        inner.in_flight.remove(key);

        if let Ok(value) = result {
            let now = Instant::now();
            if !inner.entries.contains_key(key) {
                if let Some(max) = inner.max_entries {
                    while inner.entries.len() >= max {
                        if !self.evict_lru(&mut inner) {
                            break;
                        }
                    }
                }
            }
            inner.entries.insert(
                key.clone(),
                CacheEntry {
                    value: value.clone(),
                    stored_at: now,
                    ttl,
                    last_access: now,
                },
            );
        }
    }

    fn evict_lru(&self, inner: &mut Inner<K, V>) -> bool {
        let oldest = inner
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(key, _)| key.clone());

        match oldest {
            Some(key) => {
                inner.entries.remove(&key);
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Evicted least recently used entry");
                true
            }
            None => false,
        }
    }
}
