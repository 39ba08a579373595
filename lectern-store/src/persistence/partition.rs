//! Catalog partition snapshots.
//!
//! The persisted form is a versioned JSON document with one map per catalog
//! kind, keyed by cache key id, plus the write timestamps keyed by the cache
//! key display string. Any load failure degrades to an empty store.

use std::collections::BTreeMap;

use lectern_core::{
    CatalogKind, Course, CourseStats, InstructorProfile, Lesson, PersistenceError, Timestamp,
};
use serde::{Deserialize, Serialize};

use super::adapter::StorageAdapter;
use crate::cache::{CacheKey, CacheStore, CachedData};

/// Version of the persisted state layout.
pub const STATE_VERSION: u32 = 1;

/// Persisted catalog partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub version: u32,
    #[serde(default)]
    pub courses: BTreeMap<String, Course>,
    #[serde(default)]
    pub course_lists: BTreeMap<String, Vec<Course>>,
    #[serde(default)]
    pub lessons: BTreeMap<String, Vec<Lesson>>,
    #[serde(default)]
    pub instructor_profiles: BTreeMap<String, InstructorProfile>,
    #[serde(default)]
    pub stats: BTreeMap<String, CourseStats>,
    #[serde(default)]
    pub cache_timestamps: BTreeMap<String, Timestamp>,
}

#[derive(Deserialize)]
struct VersionHeader {
    version: u32,
}

impl PersistedState {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            courses: BTreeMap::new(),
            course_lists: BTreeMap::new(),
            lessons: BTreeMap::new(),
            instructor_profiles: BTreeMap::new(),
            stats: BTreeMap::new(),
            cache_timestamps: BTreeMap::new(),
        }
    }

    /// Number of persisted entries across all slices.
    pub fn len(&self) -> usize {
        self.courses.len()
            + self.course_lists.len()
            + self.lessons.len()
            + self.instructor_profiles.len()
            + self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PersistenceError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode persisted bytes, rejecting any other layout version.
    pub fn from_bytes(bytes: &[u8], expected_version: u32) -> Result<Self, PersistenceError> {
        let header: VersionHeader = serde_json::from_slice(bytes)?;
        if header.version != expected_version {
            return Err(PersistenceError::VersionMismatch {
                found: header.version,
                expected: expected_version,
            });
        }
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Add one catalog entry. Returns false for user-scoped payloads.
    fn insert(&mut self, key: &CacheKey, data: &CachedData, cached_at: Option<Timestamp>) -> bool {
        let id = key.id().to_string();
        match data {
            CachedData::Course(course) => {
                self.courses.insert(id, course.clone());
            }
            CachedData::CourseList(courses) => {
                self.course_lists.insert(id, courses.clone());
            }
            CachedData::Lessons(lessons) => {
                self.lessons.insert(id, lessons.clone());
            }
            CachedData::Instructor(profile) => {
                self.instructor_profiles.insert(id, profile.clone());
            }
            CachedData::Stats(stats) => {
                self.stats.insert(id, stats.clone());
            }
            CachedData::Progress(_)
            | CachedData::Notes(_)
            | CachedData::Purchases(_)
            | CachedData::LastViewed(_) => return false,
        }
        if let Some(cached_at) = cached_at {
            self.cache_timestamps.insert(key.to_string(), cached_at);
        }
        true
    }

    /// Rebuild cache entries with their timestamps.
    pub fn into_entries(self) -> Vec<(CacheKey, CachedData, Option<Timestamp>)> {
        let mut timestamps = self.cache_timestamps;
        let mut entries = Vec::with_capacity(
            self.courses.len()
                + self.course_lists.len()
                + self.lessons.len()
                + self.instructor_profiles.len()
                + self.stats.len(),
        );
        let mut push = |kind: CatalogKind, id: String, data: CachedData| {
            let key = CacheKey::catalog(kind, id);
            let cached_at = timestamps.remove(&key.to_string());
            entries.push((key, data, cached_at));
        };

        for (id, course) in self.courses {
            push(CatalogKind::Course, id, CachedData::Course(course));
        }
        for (id, courses) in self.course_lists {
            push(CatalogKind::CourseList, id, CachedData::CourseList(courses));
        }
        for (id, lessons) in self.lessons {
            push(CatalogKind::Lessons, id, CachedData::Lessons(lessons));
        }
        for (id, profile) in self.instructor_profiles {
            push(CatalogKind::Instructor, id, CachedData::Instructor(profile));
        }
        for (id, stats) in self.stats {
            push(CatalogKind::Stats, id, CachedData::Stats(stats));
        }
        entries
    }
}

/// Moves the catalog partition between a store and durable storage.
pub struct PersistencePartition;

impl PersistencePartition {
    /// Catalog entries of `store`. User-scoped entries are never included.
    pub fn snapshot(store: &CacheStore) -> PersistedState {
        let mut state = PersistedState::new(store.config().state_version);
        for (key, data, cached_at) in store.catalog_entries() {
            if data.kind() != key.kind() {
                tracing::warn!(
                    key = %key,
                    payload = %data.kind(),
                    "skipping catalog entry whose payload does not match its key"
                );
                continue;
            }
            state.insert(&key, &data, cached_at);
        }
        state
    }

    /// Serialize the catalog partition and hand it to `storage`.
    pub fn persist(store: &CacheStore, storage: &dyn StorageAdapter) -> Result<(), PersistenceError> {
        let state = Self::snapshot(store);
        let bytes = state.to_bytes()?;
        storage.save(&store.config().storage_key, &bytes)?;
        tracing::trace!(entries = state.len(), bytes = bytes.len(), "persisted catalog partition");
        Ok(())
    }

    /// Restore persisted catalog entries into `store`.
    ///
    /// Returns the number of restored entries. Unavailable storage, corrupt
    /// bytes or a version mismatch log a warning and restore nothing.
    pub fn hydrate(store: &CacheStore, storage: &dyn StorageAdapter) -> usize {
        let storage_key = &store.config().storage_key;
        let bytes = match storage.load(storage_key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::debug!(storage_key = %storage_key, "no persisted state found");
                return 0;
            }
            Err(e) => {
                tracing::warn!(error = %e, "durable storage unavailable, starting with an empty cache");
                return 0;
            }
        };

        let state = match PersistedState::from_bytes(&bytes, store.config().state_version) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable persisted state");
                return 0;
            }
        };

        let mut restored = 0;
        for (key, data, cached_at) in state.into_entries() {
            if store.restore(key, data, cached_at) {
                restored += 1;
            }
        }
        tracing::info!(restored, "hydrated catalog partition");
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::StoreConfig;
    use crate::persistence::MemoryStorage;
    use chrono::Utc;
    use lectern_core::{CourseId, EntityIdType, UserId, UserKind, UserProgress};
    use std::sync::Arc;
    use std::time::Duration;

    fn lesson(id: &str) -> Lesson {
        Lesson {
            id: id.into(),
            course_id: CourseId::new("c1"),
            title: id.to_string(),
            section: None,
            order: 0,
            duration_minutes: 10,
            video_url: None,
            content: None,
        }
    }

    fn stats(course: &str) -> CourseStats {
        CourseStats {
            course_id: CourseId::new(course),
            enrolled_students: 10,
            completion_count: 2,
            average_rating: 4.0,
            review_count: 5,
            revenue_cents: 1_000,
        }
    }

    fn store(storage: Arc<MemoryStorage>) -> CacheStore {
        CacheStore::builder()
            .config(StoreConfig::new().with_persist_on_write(false))
            .clock(ManualClock::new(Utc::now()))
            .storage(storage)
            .build()
            .unwrap()
    }

    #[test]
    fn test_snapshot_excludes_user_data() {
        let store = store(Arc::new(MemoryStorage::new()));
        let user = UserId::new("u1");
        store.set(
            CacheKey::catalog(CatalogKind::Lessons, "c1"),
            CachedData::Lessons(vec![lesson("l1")]),
        );
        store.set(
            CacheKey::user_scoped(UserKind::Progress, &user, "c1"),
            CachedData::Progress(UserProgress::new(user.clone(), CourseId::new("c1"), 1, Utc::now())),
        );

        let state = PersistencePartition::snapshot(&store);
        assert_eq!(state.lessons.len(), 1);
        assert_eq!(state.len(), 1);
        assert_eq!(state.cache_timestamps.len(), 1);
        assert!(state.cache_timestamps.contains_key("lessons_c1"));
    }

    #[test]
    fn test_snapshot_skips_mismatched_payload() {
        let store = store(Arc::new(MemoryStorage::new()));
        store.set(
            CacheKey::catalog(CatalogKind::Course, "c1"),
            CachedData::Stats(stats("c1")),
        );
        assert!(PersistencePartition::snapshot(&store).is_empty());
    }

    #[test]
    fn test_persist_then_hydrate_round_trip() {
        let storage = Arc::new(MemoryStorage::new());
        let source = store(storage.clone());
        source.set(CacheKey::catalog(CatalogKind::Stats, "c1"), CachedData::Stats(stats("c1")));
        source.set(
            CacheKey::catalog(CatalogKind::Lessons, "c1"),
            CachedData::Lessons(vec![lesson("l1"), lesson("l2")]),
        );
        source.persist().unwrap();

        let target = store(storage);
        assert_eq!(target.init(), 2);
        let key = CacheKey::catalog(CatalogKind::Stats, "c1");
        assert_eq!(target.get(&key).as_deref(), Some(&CachedData::Stats(stats("c1"))));
        assert_eq!(
            PersistencePartition::snapshot(&target),
            PersistencePartition::snapshot(&source)
        );
    }

    #[test]
    fn test_hydrated_entry_without_timestamp_is_stale() {
        let storage = Arc::new(MemoryStorage::new());
        let mut state = PersistedState::new(STATE_VERSION);
        state.stats.insert("c1".to_string(), stats("c1"));
        storage.save("lectern-state", &state.to_bytes().unwrap()).unwrap();

        let store = store(storage);
        assert_eq!(store.init(), 1);
        let key = CacheKey::catalog(CatalogKind::Stats, "c1");
        assert!(store.get(&key).is_some());
        assert!(store.is_stale(&key, Some(Duration::MAX)));
    }

    #[test]
    fn test_corrupt_state_falls_back_to_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.save("lectern-state", b"{not json").unwrap();
        let store = store(storage);
        assert_eq!(store.init(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_version_mismatch_falls_back_to_empty() {
        let storage = Arc::new(MemoryStorage::new());
        let mut state = PersistedState::new(STATE_VERSION + 1);
        state.stats.insert("c1".to_string(), stats("c1"));
        storage.save("lectern-state", &state.to_bytes().unwrap()).unwrap();

        let err = PersistedState::from_bytes(&state.to_bytes().unwrap(), STATE_VERSION).unwrap_err();
        assert_eq!(
            err,
            PersistenceError::VersionMismatch {
                found: STATE_VERSION + 1,
                expected: STATE_VERSION,
            }
        );
        assert_eq!(store(storage).init(), 0);
    }

    #[test]
    fn test_hydrate_does_not_overwrite_newer_data() {
        let storage = Arc::new(MemoryStorage::new());
        let mut state = PersistedState::new(STATE_VERSION);
        state.stats.insert("c1".to_string(), stats("c1"));
        storage.save("lectern-state", &state.to_bytes().unwrap()).unwrap();

        let store = store(storage);
        let key = CacheKey::catalog(CatalogKind::Stats, "c1");
        let mut newer = stats("c1");
        newer.enrolled_students = 99;
        store.set(key.clone(), CachedData::Stats(newer.clone()));
        assert_eq!(store.init(), 0);
        assert_eq!(store.get(&key).as_deref(), Some(&CachedData::Stats(newer)));
    }
}
