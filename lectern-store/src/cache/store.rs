//! Timestamped cache store.
//!
//! A keyed map of cached payloads, each stamped with its write time, with
//! per-key subscribers and a per-key retention timer. The store is a cheap
//! clonable handle; all clones see the same entries.
//!
//! # Locking
//!
//! Entries live behind one `std::sync::RwLock`. Critical sections only touch
//! the map: subscriber callbacks and persistence run after the lock is
//! released, so a callback may read or write the store.
//!
//! # Eviction
//!
//! Every write re-arms a Tokio timer for the key. When it fires after the
//! retention window the entry is removed, unless it has subscribers or a
//! newer timer has been armed since. Hydrated entries get a timer too.
//! Without a Tokio runtime no timer is armed and entries live until cleared.
//!
//! # Persistence
//!
//! Catalog writes schedule one snapshot after `persist_debounce`; writes that
//! land while it is queued share it. The snapshot runs on Tokio's blocking
//! pool. Without a runtime the snapshot is written before `set` returns.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use lectern_core::{LecternResult, PersistenceError, Timestamp};
use tokio::task::AbortHandle;

use super::freshness::{is_stale_at, CacheRead};
use super::key::CacheKey;
use super::subject::{ObserverId, ObserverIds, Subject};
use super::traits::CacheStats;
use super::value::CachedData;
use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::persistence::{PersistencePartition, StorageAdapter};

// ============================================================================
// ENTRY SLOTS
// ============================================================================

/// One key's state. A slot may exist without data when a caller subscribed
/// before the first write or kept a subscription across a clear.
struct Slot {
    data: Option<Arc<CachedData>>,
    cached_at: Option<Timestamp>,
    subscribers: Subject<Arc<CachedData>>,
    eviction: Option<AbortHandle>,
    /// Identifies the currently armed eviction timer.
    generation: u64,
}

impl Slot {
    fn empty(ids: &ObserverIds) -> Self {
        Self {
            data: None,
            cached_at: None,
            subscribers: Subject::with_ids(ids.clone()),
            eviction: None,
            generation: 0,
        }
    }

    fn cancel_eviction(&mut self) {
        if let Some(handle) = self.eviction.take() {
            handle.abort();
        }
    }

    /// Drop the data and timer, keeping subscribers.
    fn clear(&mut self) -> Option<Arc<CachedData>> {
        self.cancel_eviction();
        self.cached_at = None;
        self.data.take()
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    evictions: AtomicU64,
}

pub(crate) struct StoreInner {
    entries: RwLock<HashMap<CacheKey, Slot>>,
    clock: Arc<dyn Clock>,
    config: StoreConfig,
    storage: Option<Arc<dyn StorageAdapter>>,
    counters: Counters,
    next_generation: AtomicU64,
    /// Shared by every slot so a stale guard never matches a newer observer.
    observer_ids: ObserverIds,
    persist_pending: AtomicBool,
    /// Orders snapshot-and-save so an older snapshot never lands last.
    persist_lock: Mutex<()>,
}

impl StoreInner {
    fn read_entries(&self) -> RwLockReadGuard<'_, HashMap<CacheKey, Slot>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, HashMap<CacheKey, Slot>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn new_slot(&self) -> Slot {
        Slot::empty(&self.observer_ids)
    }

    fn record_read(&self, hit: bool) {
        let counter = if hit {
            &self.counters.hits
        } else {
            &self.counters.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Replace the slot's eviction timer with a fresh one.
    fn arm_eviction(this: &Arc<Self>, key: &CacheKey, slot: &mut Slot) {
        slot.cancel_eviction();
        slot.generation = this.next_generation.fetch_add(1, Ordering::Relaxed) + 1;

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store: Weak<Self> = Arc::downgrade(this);
        let key = key.clone();
        let generation = slot.generation;
        let retention = this.config.retention;
        let task = runtime.spawn(async move {
            tokio::time::sleep(retention).await;
            if let Some(inner) = store.upgrade() {
                inner.evict_if_idle(&key, generation);
            }
        });
        slot.eviction = Some(task.abort_handle());
    }

    fn evict_if_idle(&self, key: &CacheKey, generation: u64) {
        let mut entries = self.write_entries();
        let idle = match entries.get_mut(key) {
            Some(slot) if slot.generation == generation => {
                slot.eviction = None;
                slot.subscribers.is_empty()
            }
            _ => false,
        };
        if idle {
            entries.remove(key);
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, "evicted idle cache entry");
        }
    }

    fn unsubscribe(this: &Arc<Self>, key: &CacheKey, id: ObserverId) {
        let mut entries = this.write_entries();
        let Some(slot) = entries.get_mut(key) else {
            return;
        };
        slot.subscribers.unsubscribe(id);
        if !slot.subscribers.is_empty() {
            return;
        }
        if slot.data.is_none() {
            entries.remove(key);
            return;
        }
        // Retention restarts from the moment the last observer left.
        Self::arm_eviction(this, key, slot);
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        let entries = self.entries.get_mut().unwrap_or_else(PoisonError::into_inner);
        for slot in entries.values_mut() {
            slot.cancel_eviction();
        }
    }
}

// ============================================================================
// STORE HANDLE
// ============================================================================

/// Handle to a timestamped cache store.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<StoreInner>,
}

impl CacheStore {
    /// Store with the system clock and no durable storage.
    pub fn new(config: StoreConfig) -> LecternResult<Self> {
        Self::builder().config(config).build()
    }

    pub fn builder() -> CacheStoreBuilder {
        CacheStoreBuilder::default()
    }

    /// Hydrate persisted catalog data. Returns the number of restored entries.
    ///
    /// Never fails: unreadable storage leaves the store empty.
    pub fn init(&self) -> usize {
        match &self.inner.storage {
            Some(storage) => PersistencePartition::hydrate(self, storage.as_ref()),
            None => 0,
        }
    }

    /// Cancel every eviction timer and drop every entry and subscriber.
    pub fn dispose(&self) {
        let mut entries = self.inner.write_entries();
        for slot in entries.values_mut() {
            slot.cancel_eviction();
        }
        let dropped = entries.len();
        entries.clear();
        tracing::debug!(entries = dropped, "cache store disposed");
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn now(&self) -> Timestamp {
        self.inner.clock.now()
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<CachedData>> {
        let found = self
            .inner
            .read_entries()
            .get(key)
            .and_then(|slot| slot.data.clone());
        self.inner.record_read(found.is_some());
        found
    }

    /// Like [`get`](Self::get), with the write timestamp and staleness.
    pub fn read(&self, key: &CacheKey) -> Option<CacheRead> {
        let now = self.now();
        let found = self.inner.read_entries().get(key).and_then(|slot| {
            slot.data
                .clone()
                .map(|data| CacheRead::new(data, slot.cached_at, now))
        });
        self.inner.record_read(found.is_some());
        found
    }

    /// Write `data` under `key`, stamped with the current time.
    ///
    /// Subscribers are preserved and notified with the new value before this
    /// returns. Catalog writes schedule a snapshot when `persist_on_write` is
    /// set.
    pub fn set(&self, key: CacheKey, data: CachedData) -> Arc<CachedData> {
        let data = Arc::new(data);
        let now = self.now();
        let subscribers = {
            let mut entries = self.inner.write_entries();
            let slot = entries.entry(key.clone()).or_insert_with(|| self.inner.new_slot());
            slot.data = Some(Arc::clone(&data));
            slot.cached_at = Some(now);
            StoreInner::arm_eviction(&self.inner, &key, slot);
            slot.subscribers.clone()
        };
        self.inner.counters.writes.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(key = %key, "cache entry written");

        if key.is_catalog() && self.inner.config.persist_on_write {
            self.schedule_persist();
        }
        subscribers.notify(&data);
        data
    }

    /// True when the entry is missing, invalidated or older than `max_age`
    /// (the configured default when `None`).
    pub fn is_stale(&self, key: &CacheKey, max_age: Option<Duration>) -> bool {
        let max_age = max_age.unwrap_or(self.inner.config.default_max_age);
        let cached_at = self
            .inner
            .read_entries()
            .get(key)
            .filter(|slot| slot.data.is_some())
            .and_then(|slot| slot.cached_at);
        is_stale_at(cached_at, self.now(), max_age)
    }

    /// Call `callback` with the new value on every future write of `key`.
    ///
    /// The key does not need to exist yet. Dropping the returned
    /// [`Subscription`] unsubscribes.
    pub fn subscribe<F>(&self, key: &CacheKey, callback: F) -> Subscription
    where
        F: Fn(&Arc<CachedData>) + Send + Sync + 'static,
    {
        let id = {
            let mut entries = self.inner.write_entries();
            let slot = entries.entry(key.clone()).or_insert_with(|| self.inner.new_slot());
            slot.subscribers.subscribe(Arc::new(callback))
        };
        Subscription {
            store: Arc::downgrade(&self.inner),
            key: key.clone(),
            id: Some(id),
        }
    }

    pub fn subscriber_count(&self, key: &CacheKey) -> usize {
        self.inner
            .read_entries()
            .get(key)
            .map_or(0, |slot| slot.subscribers.len())
    }

    /// Keep the data but mark it stale. Returns false when there was no data.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let mut entries = self.inner.write_entries();
        match entries.get_mut(key) {
            Some(slot) if slot.data.is_some() => {
                slot.cached_at = None;
                true
            }
            _ => false,
        }
    }

    /// Drop one entry and its timer. Subscribers stay registered.
    pub fn remove(&self, key: &CacheKey) -> Option<Arc<CachedData>> {
        let mut entries = self.inner.write_entries();
        let slot = entries.get_mut(key)?;
        let removed = slot.clear();
        if slot.subscribers.is_empty() {
            entries.remove(key);
        }
        removed
    }

    /// Remove every user-scoped entry. Catalog entries are untouched.
    pub fn clear_user_data(&self) -> usize {
        let mut cleared = 0;
        self.inner.write_entries().retain(|key, slot| {
            if key.is_catalog() {
                return true;
            }
            if slot.clear().is_some() {
                cleared += 1;
            }
            !slot.subscribers.is_empty()
        });
        tracing::debug!(cleared, "cleared user-scoped cache entries");
        cleared
    }

    /// Remove every catalog entry and mark the remaining user entries stale,
    /// then persist the now empty catalog partition.
    pub fn clear_cache(&self) -> usize {
        let mut cleared = 0;
        self.inner.write_entries().retain(|key, slot| {
            if !key.is_catalog() {
                slot.cached_at = None;
                return true;
            }
            if slot.clear().is_some() {
                cleared += 1;
            }
            !slot.subscribers.is_empty()
        });
        tracing::debug!(cleared, "cleared catalog cache entries");
        self.persist_quietly();
        cleared
    }

    /// Keys that currently hold data.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.inner
            .read_entries()
            .iter()
            .filter(|(_, slot)| slot.data.is_some())
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read_entries()
            .values()
            .filter(|slot| slot.data.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let counters = &self.inner.counters;
        CacheStats {
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            entry_count: self.len() as u64,
            writes: counters.writes.load(Ordering::Relaxed),
            evictions: counters.evictions.load(Ordering::Relaxed),
        }
    }

    /// Write the catalog partition to durable storage now, if any is
    /// configured. Also flushes a pending scheduled snapshot.
    pub fn persist(&self) -> Result<(), PersistenceError> {
        let Some(storage) = &self.inner.storage else {
            return Ok(());
        };
        let _ordered = self.inner.persist_lock.lock().unwrap_or_else(PoisonError::into_inner);
        PersistencePartition::persist(self, storage.as_ref())
    }

    /// Queue a catalog snapshot unless one is already queued.
    fn schedule_persist(&self) {
        if self.inner.storage.is_none() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.persist_quietly();
            return;
        };
        if self.inner.persist_pending.swap(true, Ordering::AcqRel) {
            return;
        }
        let store = self.clone();
        let debounce = self.inner.config.persist_debounce;
        runtime.spawn(async move {
            tokio::time::sleep(debounce).await;
            store.inner.persist_pending.store(false, Ordering::Release);
            if let Err(e) = tokio::task::spawn_blocking(move || store.persist_quietly()).await {
                tracing::warn!(error = %e, "catalog snapshot task failed");
            }
        });
    }

    fn persist_quietly(&self) {
        if let Err(e) = self.persist() {
            tracing::warn!(error = %e, "failed to persist catalog partition");
        }
    }

    /// Catalog entries holding data, for persistence snapshots.
    pub(crate) fn catalog_entries(&self) -> Vec<(CacheKey, Arc<CachedData>, Option<Timestamp>)> {
        self.inner
            .read_entries()
            .iter()
            .filter(|(key, _)| key.is_catalog())
            .filter_map(|(key, slot)| {
                slot.data
                    .as_ref()
                    .map(|data| (key.clone(), Arc::clone(data), slot.cached_at))
            })
            .collect()
    }

    /// Insert hydrated data and start its retention window, without
    /// notifying.
    ///
    /// Existing data wins; returns false when the key already held a value.
    pub(crate) fn restore(&self, key: CacheKey, data: CachedData, cached_at: Option<Timestamp>) -> bool {
        let mut entries = self.inner.write_entries();
        let slot = entries.entry(key.clone()).or_insert_with(|| self.inner.new_slot());
        if slot.data.is_some() {
            return false;
        }
        slot.data = Some(Arc::new(data));
        slot.cached_at = cached_at;
        StoreInner::arm_eviction(&self.inner, &key, slot);
        true
    }
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("entries", &self.len())
            .field("config", &self.inner.config)
            .field("clock", &self.inner.clock)
            .field("durable", &self.inner.storage.is_some())
            .finish()
    }
}

/// Builder for [`CacheStore`].
#[derive(Default)]
pub struct CacheStoreBuilder {
    config: StoreConfig,
    clock: Option<Arc<dyn Clock>>,
    storage: Option<Arc<dyn StorageAdapter>>,
}

impl CacheStoreBuilder {
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn storage(mut self, storage: Arc<dyn StorageAdapter>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Validate the configuration and build the store. Call
    /// [`CacheStore::init`] to hydrate persisted data.
    pub fn build(self) -> LecternResult<CacheStore> {
        self.config.validate()?;
        Ok(CacheStore {
            inner: Arc::new(StoreInner {
                entries: RwLock::new(HashMap::new()),
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                config: self.config,
                storage: self.storage,
                counters: Counters::default(),
                next_generation: AtomicU64::new(0),
                observer_ids: ObserverIds::new(),
                persist_pending: AtomicBool::new(false),
                persist_lock: Mutex::new(()),
            }),
        })
    }
}

// ============================================================================
// SUBSCRIPTIONS
// ============================================================================

/// Guard for a store subscription. Unsubscribes when dropped.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    store: Weak<StoreInner>,
    key: CacheKey,
    id: Option<ObserverId>,
}

impl Subscription {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(id) = self.id.take() {
            if let Some(inner) = self.store.upgrade() {
                StoreInner::unsubscribe(&inner, &self.key, id);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("active", &self.id.is_some())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::persistence::MemoryStorage;
    use lectern_core::{
        CatalogKind, ConfigError, CourseId, CourseStats, EntityIdType, LecternError, LessonId, UserId,
        UserKind, UserProgress,
    };
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    const RETENTION: Duration = Duration::from_secs(600);

    fn store_with_clock() -> (CacheStore, ManualClock) {
        let clock = ManualClock::default();
        let store = CacheStore::builder()
            .config(StoreConfig::new().with_retention(RETENTION))
            .clock(clock.clone())
            .build()
            .unwrap();
        (store, clock)
    }

    fn stats_data(course: &str, enrolled: u64) -> CachedData {
        CachedData::Stats(CourseStats {
            course_id: CourseId::new(course),
            enrolled_students: enrolled,
            completion_count: 0,
            average_rating: 0.0,
            review_count: 0,
            revenue_cents: 0,
        })
    }

    fn progress_data(user: &UserId, course: &str) -> CachedData {
        CachedData::Progress(UserProgress::new(
            user.clone(),
            CourseId::new(course),
            4,
            chrono::Utc::now(),
        ))
    }

    fn stats_key(course: &str) -> CacheKey {
        CacheKey::catalog(CatalogKind::Stats, course)
    }

    /// Memory storage that counts and announces every save.
    #[derive(Debug, Default)]
    struct CountingStorage {
        inner: MemoryStorage,
        saves: AtomicUsize,
        saved: tokio::sync::Notify,
    }

    impl StorageAdapter for CountingStorage {
        fn save(&self, key: &str, bytes: &[u8]) -> Result<(), PersistenceError> {
            self.inner.save(key, bytes)?;
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.saved.notify_one();
            Ok(())
        }

        fn load(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
            self.inner.load(key)
        }

        fn remove(&self, key: &str) -> Result<(), PersistenceError> {
            self.inner.remove(key)
        }
    }

    async fn run_timers(duration: Duration) {
        tokio::time::sleep(duration).await;
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_missing_entry_is_stale_and_absent() {
        let (store, _) = store_with_clock();
        let key = stats_key("c1");
        assert!(store.is_stale(&key, Some(Duration::from_secs(3600))));
        assert!(store.get(&key).is_none());
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn test_set_then_get_is_fresh() {
        let (store, _) = store_with_clock();
        let key = stats_key("c1");
        let written = store.set(key.clone(), stats_data("c1", 3));
        let read = store.get(&key).unwrap();
        assert!(Arc::ptr_eq(&written, &read));
        assert!(!store.is_stale(&key, Some(Duration::from_secs(1))));
        assert_eq!(store.stats().hits, 1);
    }

    #[test]
    fn test_staleness_after_max_age() {
        let (store, clock) = store_with_clock();
        let key = stats_key("c1");
        store.set(key.clone(), stats_data("c1", 1));
        let max_age = Some(Duration::from_secs(60));

        clock.advance(Duration::from_secs(60));
        assert!(!store.is_stale(&key, max_age));
        clock.advance(Duration::from_millis(1));
        assert!(store.is_stale(&key, max_age));
        clock.advance(Duration::from_secs(3600));
        assert!(store.is_stale(&key, max_age));

        store.set(key.clone(), stats_data("c1", 2));
        assert!(!store.is_stale(&key, max_age));
    }

    #[test]
    fn test_default_max_age_from_config() {
        let (store, clock) = store_with_clock();
        let key = stats_key("c1");
        store.set(key.clone(), stats_data("c1", 1));
        clock.advance(Duration::from_secs(299));
        assert!(!store.is_stale(&key, None));
        clock.advance(Duration::from_secs(2));
        assert!(store.is_stale(&key, None));
    }

    #[test]
    fn test_read_reports_staleness() {
        let (store, clock) = store_with_clock();
        let key = stats_key("c1");
        store.set(key.clone(), stats_data("c1", 1));
        clock.advance(Duration::from_secs(42));
        let read = store.read(&key).unwrap();
        assert_eq!(read.staleness(), Some(Duration::from_secs(42)));
    }

    #[test]
    fn test_subscriber_notified_before_set_returns() {
        let (store, _) = store_with_clock();
        let key = stats_key("c1");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = store.subscribe(&key, move |data| {
            sink.lock().unwrap().push(Arc::clone(data));
        });

        let written = store.set(key.clone(), stats_data("c1", 7));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(Arc::ptr_eq(&seen[0], &written));
    }

    #[test]
    fn test_subscribers_survive_overwrites() {
        let (store, _) = store_with_clock();
        let key = stats_key("c1");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let sub = store.subscribe(&key, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        store.set(key.clone(), stats_data("c1", 1));
        store.set(key.clone(), stats_data("c1", 2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        sub.unsubscribe();
        store.set(key.clone(), stats_data("c1", 3));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.subscriber_count(&key), 0);
    }

    #[test]
    fn test_callback_can_read_store() {
        let (store, _) = store_with_clock();
        let key = stats_key("c1");
        let reader = store.clone();
        let observed = Arc::new(AtomicUsize::new(0));
        let out = Arc::clone(&observed);
        let read_key = key.clone();
        let _sub = store.subscribe(&key, move |_| {
            if reader.get(&read_key).is_some() {
                out.fetch_add(1, Ordering::SeqCst);
            }
        });
        store.set(key, stats_data("c1", 1));
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribe_before_first_write_does_not_create_data() {
        let (store, _) = store_with_clock();
        let key = stats_key("c1");
        let sub = store.subscribe(&key, |_| {});
        assert!(store.get(&key).is_none());
        assert!(store.is_stale(&key, None));
        assert!(store.is_empty());
        drop(sub);
        assert_eq!(store.subscriber_count(&key), 0);
    }

    #[test]
    fn test_invalidate_keeps_data_but_marks_stale() {
        let (store, _) = store_with_clock();
        let key = stats_key("c1");
        store.set(key.clone(), stats_data("c1", 1));
        assert!(store.invalidate(&key));
        assert!(store.get(&key).is_some());
        assert!(store.is_stale(&key, Some(Duration::MAX)));
        assert!(!store.invalidate(&stats_key("missing")));
    }

    #[test]
    fn test_clear_user_data_keeps_catalog() {
        let (store, _) = store_with_clock();
        let user = UserId::new("u1");
        let catalog = stats_key("c1");
        let progress = CacheKey::user_scoped(UserKind::Progress, &user, "c1");
        store.set(catalog.clone(), stats_data("c1", 1));
        store.set(progress.clone(), progress_data(&user, "c1"));

        assert_eq!(store.clear_user_data(), 1);
        assert!(store.get(&catalog).is_some());
        assert!(store.get(&progress).is_none());
    }

    #[test]
    fn test_clear_cache_drops_catalog_and_stales_user_data() {
        let (store, _) = store_with_clock();
        let user = UserId::new("u1");
        let catalog = stats_key("c1");
        let notes = CacheKey::user_scoped(UserKind::Notes, &user, LessonId::new("l1").as_str());
        store.set(catalog.clone(), stats_data("c1", 1));
        store.set(notes.clone(), CachedData::Notes(Vec::new()));

        assert_eq!(store.clear_cache(), 1);
        assert!(store.get(&catalog).is_none());
        assert!(store.get(&notes).is_some());
        assert!(store.is_stale(&notes, Some(Duration::MAX)));
    }

    #[test]
    fn test_clear_cache_persists_empty_catalog() {
        let storage = Arc::new(MemoryStorage::new());
        let store = CacheStore::builder().storage(storage.clone()).build().unwrap();
        store.set(stats_key("c1"), stats_data("c1", 1));
        store.clear_cache();

        let reloaded = CacheStore::builder().storage(storage).build().unwrap();
        assert_eq!(reloaded.init(), 0);
        assert!(reloaded.is_empty());
    }

    #[test]
    fn test_remove_and_dispose() {
        let (store, _) = store_with_clock();
        let key = stats_key("c1");
        store.set(key.clone(), stats_data("c1", 1));
        store.set(stats_key("c2"), stats_data("c2", 1));
        assert!(store.remove(&key).is_some());
        assert!(store.remove(&key).is_none());
        assert_eq!(store.len(), 1);
        store.dispose();
        assert!(store.is_empty());
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let err = CacheStore::builder()
            .config(StoreConfig::new().with_retention(Duration::ZERO))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            LecternError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "retention"
        ));
        assert!(CacheStore::new(StoreConfig::new().with_max_age(Duration::ZERO)).is_err());
        assert!(CacheStore::new(StoreConfig::new().with_storage_key("")).is_err());
        assert!(CacheStore::new(StoreConfig::new()).is_ok());
    }

    #[test]
    fn test_released_guard_cannot_drop_a_later_subscriber() {
        let (store, _) = store_with_clock();
        let key = stats_key("c1");
        let before_dispose = store.subscribe(&key, |_| {});
        store.dispose();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _after_dispose = store.subscribe(&key, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(before_dispose);
        assert_eq!(store.subscriber_count(&key), 1);

        store.set(key.clone(), stats_data("c1", 1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_timer_without_runtime() {
        let (store, _) = store_with_clock();
        let key = stats_key("c1");
        store.set(key.clone(), stats_data("c1", 1));
        assert!(store.get(&key).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unobserved_entry_evicted_after_retention() {
        let (store, _) = store_with_clock();
        let key = stats_key("c1");
        store.set(key.clone(), stats_data("c1", 1));

        run_timers(RETENTION - Duration::from_secs(1)).await;
        assert!(store.get(&key).is_some());

        run_timers(Duration::from_secs(2)).await;
        assert!(store.get(&key).is_none());
        assert_eq!(store.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_restarts_retention() {
        let (store, _) = store_with_clock();
        let key = stats_key("c1");
        store.set(key.clone(), stats_data("c1", 1));
        run_timers(RETENTION / 2).await;
        store.set(key.clone(), stats_data("c1", 2));

        run_timers(RETENTION / 2 + Duration::from_secs(1)).await;
        assert!(store.get(&key).is_some());

        run_timers(RETENTION / 2).await;
        assert!(store.get(&key).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribed_entry_not_evicted_until_released() {
        let (store, _) = store_with_clock();
        let key = stats_key("c1");
        let sub = store.subscribe(&key, |_| {});
        store.set(key.clone(), stats_data("c1", 1));

        run_timers(RETENTION * 2).await;
        assert!(store.get(&key).is_some());

        drop(sub);
        run_timers(RETENTION - Duration::from_secs(1)).await;
        assert!(store.get(&key).is_some());
        run_timers(Duration::from_secs(2)).await;
        assert!(store.get(&key).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hydrated_entry_evicted_after_retention() {
        let storage = Arc::new(MemoryStorage::new());
        let writer = CacheStore::builder()
            .config(StoreConfig::new().with_persist_on_write(false))
            .storage(storage.clone())
            .build()
            .unwrap();
        writer.set(stats_key("c1"), stats_data("c1", 1));
        writer.persist().unwrap();

        let store = CacheStore::builder()
            .config(StoreConfig::new().with_retention(RETENTION))
            .clock(ManualClock::default())
            .storage(storage)
            .build()
            .unwrap();
        assert_eq!(store.init(), 1);

        run_timers(RETENTION - Duration::from_secs(1)).await;
        assert!(store.get(&stats_key("c1")).is_some());
        run_timers(Duration::from_secs(2)).await;
        assert!(store.get(&stats_key("c1")).is_none());
        assert_eq!(store.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_catalog_writes_share_one_snapshot() {
        let storage = Arc::new(CountingStorage::default());
        let store = CacheStore::builder()
            .clock(ManualClock::default())
            .storage(storage.clone())
            .build()
            .unwrap();
        let keys: Vec<CacheKey> = (0..10).map(|i| stats_key(&format!("c{i}"))).collect();
        let _held: Vec<Subscription> = keys.iter().map(|key| store.subscribe(key, |_| {})).collect();

        for (i, key) in keys.iter().enumerate() {
            store.set(key.clone(), stats_data("c", i as u64));
        }
        assert_eq!(storage.saves.load(Ordering::SeqCst), 0);

        storage.saved.notified().await;
        assert_eq!(storage.saves.load(Ordering::SeqCst), 1);

        let reloaded = CacheStore::builder().storage(storage.clone()).build().unwrap();
        assert_eq!(reloaded.init(), 10);
    }
}
