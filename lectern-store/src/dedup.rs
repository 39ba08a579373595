//! Query deduplication in front of the cache store.
//!
//! A read for a key that is fresh in the store is answered from the store.
//! Otherwise at most one fetch per key runs at a time: the first caller
//! spawns it on the Tokio runtime and every concurrent caller awaits the same
//! shared future, so all of them receive the identical `Arc`.
//!
//! A failed fetch never surfaces as an error. It is logged and the waiters
//! resolve with the last value the store holds for the key, or `None`.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use lectern_core::{FetchError, LecternError, LecternResult};

use crate::cache::{CacheKey, CacheStore, CachedData, CachedEntity};

type SharedFetch = Shared<BoxFuture<'static, Option<Arc<CachedData>>>>;

struct InFlight {
    ticket: u64,
    fetch: SharedFetch,
}

type InFlightMap = Arc<Mutex<HashMap<CacheKey, InFlight>>>;

#[derive(Debug, Default)]
struct DedupCounters {
    fresh_hits: AtomicU64,
    started: AtomicU64,
    coalesced: AtomicU64,
    failures: AtomicU64,
}

/// Counters describing deduplicator activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupStats {
    /// Reads answered from a fresh store entry.
    pub fresh_hits: u64,
    /// Fetches actually issued.
    pub started: u64,
    /// Reads that joined a fetch already in flight.
    pub coalesced: u64,
    /// Fetches that failed and fell back to the cached value.
    pub failures: u64,
}

/// Coalesces concurrent fetches for the same cache key.
#[derive(Clone)]
pub struct QueryDeduplicator {
    store: CacheStore,
    in_flight: InFlightMap,
    counters: Arc<DedupCounters>,
    next_ticket: Arc<AtomicU64>,
}

impl QueryDeduplicator {
    pub fn new(store: CacheStore) -> Self {
        Self {
            store,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            counters: Arc::new(DedupCounters::default()),
            next_ticket: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Return the cached value for `key` when fresh, otherwise fetch it once.
    ///
    /// `fetcher` is only invoked when this call starts a new fetch. `max_age`
    /// defaults to the store's configured staleness window.
    pub async fn fetch<F, Fut>(
        &self,
        key: CacheKey,
        max_age: Option<Duration>,
        fetcher: F,
    ) -> Option<Arc<CachedData>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LecternResult<CachedData>> + Send + 'static,
    {
        if !self.store.is_stale(&key, max_age) {
            if let Some(data) = self.store.get(&key) {
                self.counters.fresh_hits.fetch_add(1, Ordering::Relaxed);
                return Some(data);
            }
        }
        self.join_or_start(key, fetcher).await
    }

    /// Typed [`fetch`](Self::fetch): `None` when nothing is available or the
    /// cached payload is of another kind.
    pub async fn fetch_as<T, F, Fut>(&self, key: CacheKey, max_age: Option<Duration>, fetcher: F) -> Option<T>
    where
        T: CachedEntity,
        F: FnOnce() -> Fut,
        Fut: Future<Output = LecternResult<CachedData>> + Send + 'static,
    {
        let data = self.fetch(key, max_age, fetcher).await?;
        T::from_data(&data).cloned()
    }

    /// True while a fetch for `key` is running.
    pub fn in_flight(&self, key: &CacheKey) -> bool {
        self.lock_in_flight().contains_key(key)
    }

    pub fn stats(&self) -> DedupStats {
        DedupStats {
            fresh_hits: self.counters.fresh_hits.load(Ordering::Relaxed),
            started: self.counters.started.load(Ordering::Relaxed),
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join the fetch running for `key`, or register a new one.
    ///
    /// Registration happens under the in-flight lock, before the spawned task
    /// can reach its own cleanup, so a finished fetch is never re-registered.
    fn join_or_start<F, Fut>(&self, key: CacheKey, fetcher: F) -> SharedFetch
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LecternResult<CachedData>> + Send + 'static,
    {
        let mut in_flight = self.lock_in_flight();
        if let Some(running) = in_flight.get(&key) {
            self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, "joining in-flight fetch");
            return running.fetch.clone();
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        self.counters.started.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key = %key, "starting fetch");

        let fetch = self.spawn_fetch(key.clone(), ticket, fetcher());
        in_flight.insert(
            key,
            InFlight {
                ticket,
                fetch: fetch.clone(),
            },
        );
        fetch
    }

    fn spawn_fetch<Fut>(&self, key: CacheKey, ticket: u64, fut: Fut) -> SharedFetch
    where
        Fut: Future<Output = LecternResult<CachedData>> + Send + 'static,
    {
        let task = FetchTask {
            store: self.store.clone(),
            in_flight: Arc::clone(&self.in_flight),
            counters: Arc::clone(&self.counters),
            key,
            ticket,
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            // No runtime to detach onto: the first waiter drives the fetch.
            return async move { task.run(fut).await }.boxed().shared();
        };

        let cleanup = task.clone();
        let handle = runtime.spawn(async move { task.run(fut).await });
        async move {
            match handle.await {
                Ok(value) => value,
                Err(e) => {
                    tracing::error!(key = %cleanup.key, error = %e, "fetch task did not complete");
                    let reason = FetchError::Aborted {
                        key: cleanup.key.to_string(),
                        reason: e.to_string(),
                    };
                    cleanup.settle(Err(reason.into()))
                }
            }
        }
        .boxed()
        .shared()
    }
}

impl fmt::Debug for QueryDeduplicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryDeduplicator")
            .field("in_flight", &self.lock_in_flight().len())
            .field("stats", &self.stats())
            .finish()
    }
}

/// State a running fetch needs to publish its result.
#[derive(Clone)]
struct FetchTask {
    store: CacheStore,
    in_flight: InFlightMap,
    counters: Arc<DedupCounters>,
    key: CacheKey,
    ticket: u64,
}

impl FetchTask {
    async fn run<Fut>(self, fut: Fut) -> Option<Arc<CachedData>>
    where
        Fut: Future<Output = LecternResult<CachedData>>,
    {
        let outcome = fut.await;
        self.settle(outcome)
    }

    /// Write or degrade the outcome, then clear the in-flight marker.
    fn settle(&self, outcome: LecternResult<CachedData>) -> Option<Arc<CachedData>> {
        let outcome = outcome.and_then(|data| {
            if data.kind() == self.key.kind() {
                Ok(data)
            } else {
                Err(LecternError::from(FetchError::Rejected {
                    kind: self.key.kind(),
                    reason: format!("service returned a {} payload", data.kind()),
                }))
            }
        });

        let value = match outcome {
            Ok(data) => Some(self.store.set(self.key.clone(), data)),
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                let fallback = self.store.get(&self.key);
                tracing::warn!(
                    key = %self.key,
                    error = %e,
                    has_fallback = fallback.is_some(),
                    "fetch failed, serving last cached value"
                );
                fallback
            }
        };

        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight.get(&self.key).is_some_and(|f| f.ticket == self.ticket) {
            in_flight.remove(&self.key);
        }
        value
    }
}
