//! Cached entity mapping and cache statistics.
//!
//! Every payload type stored in the cache implements [`CachedEntity`] plus one
//! of the partition traits, which decide how its cache key is formed. The
//! repositories and the fetch layer rely on these impls so a given entity is
//! always stored under the same key.

use lectern_core::{
    CatalogKind, CatalogQuery, Course, CourseId, CourseStats, EntityIdType, EntityKind,
    InstructorId, InstructorProfile, LastViewed, Lesson, LessonId, Note, Purchase, UserId,
    UserKind, UserProgress,
};

use super::key::CacheKey;
use super::value::CachedData;

/// Id segment used for per-user collections that have no natural id.
pub const ALL_ID: &str = "all";

/// Types that can be stored in the cache.
pub trait CachedEntity: Clone + Send + Sync + 'static {
    fn kind() -> EntityKind;

    fn into_data(self) -> CachedData;

    /// Borrow the payload when `data` holds this type.
    fn from_data(data: &CachedData) -> Option<&Self>;
}

/// Shared catalog entity, keyed by an id or query.
pub trait CatalogEntity: CachedEntity {
    const KIND: CatalogKind;
    type Key: ?Sized;

    fn cache_key(key: &Self::Key) -> CacheKey;
}

/// Entity owned by one user.
pub trait UserEntity: CachedEntity {
    const KIND: UserKind;
    type Key: ?Sized;

    fn cache_key(user: &UserId, key: &Self::Key) -> CacheKey;
}

macro_rules! cached_entity {
    ($ty:ty, $variant:ident, $kind:expr) => {
        impl CachedEntity for $ty {
            fn kind() -> EntityKind {
                $kind.into()
            }

            fn into_data(self) -> CachedData {
                CachedData::$variant(self)
            }

            fn from_data(data: &CachedData) -> Option<&Self> {
                match data {
                    CachedData::$variant(value) => Some(value),
                    _ => None,
                }
            }
        }
    };
}

cached_entity!(Course, Course, CatalogKind::Course);
cached_entity!(Vec<Course>, CourseList, CatalogKind::CourseList);
cached_entity!(Vec<Lesson>, Lessons, CatalogKind::Lessons);
cached_entity!(InstructorProfile, Instructor, CatalogKind::Instructor);
cached_entity!(CourseStats, Stats, CatalogKind::Stats);
cached_entity!(UserProgress, Progress, UserKind::Progress);
cached_entity!(Vec<Note>, Notes, UserKind::Notes);
cached_entity!(Vec<Purchase>, Purchases, UserKind::Purchases);
cached_entity!(LastViewed, LastViewed, UserKind::LastViewed);

impl CatalogEntity for Course {
    const KIND: CatalogKind = CatalogKind::Course;
    type Key = CourseId;

    fn cache_key(key: &CourseId) -> CacheKey {
        CacheKey::catalog(Self::KIND, key.as_str())
    }
}

impl CatalogEntity for Vec<Course> {
    const KIND: CatalogKind = CatalogKind::CourseList;
    type Key = CatalogQuery;

    fn cache_key(query: &CatalogQuery) -> CacheKey {
        CacheKey::query(Self::KIND, query.params())
    }
}

impl CatalogEntity for Vec<Lesson> {
    const KIND: CatalogKind = CatalogKind::Lessons;
    type Key = CourseId;

    fn cache_key(key: &CourseId) -> CacheKey {
        CacheKey::catalog(Self::KIND, key.as_str())
    }
}

impl CatalogEntity for InstructorProfile {
    const KIND: CatalogKind = CatalogKind::Instructor;
    type Key = InstructorId;

    fn cache_key(key: &InstructorId) -> CacheKey {
        CacheKey::catalog(Self::KIND, key.as_str())
    }
}

impl CatalogEntity for CourseStats {
    const KIND: CatalogKind = CatalogKind::Stats;
    type Key = CourseId;

    fn cache_key(key: &CourseId) -> CacheKey {
        CacheKey::catalog(Self::KIND, key.as_str())
    }
}

impl UserEntity for UserProgress {
    const KIND: UserKind = UserKind::Progress;
    type Key = CourseId;

    fn cache_key(user: &UserId, key: &CourseId) -> CacheKey {
        CacheKey::user_scoped(Self::KIND, user, key.as_str())
    }
}

impl UserEntity for Vec<Note> {
    const KIND: UserKind = UserKind::Notes;
    type Key = LessonId;

    fn cache_key(user: &UserId, key: &LessonId) -> CacheKey {
        CacheKey::user_scoped(Self::KIND, user, key.as_str())
    }
}

/// Purchases are one collection per user.
impl UserEntity for Vec<Purchase> {
    const KIND: UserKind = UserKind::Purchases;
    type Key = ();

    fn cache_key(user: &UserId, _key: &()) -> CacheKey {
        CacheKey::user_scoped(Self::KIND, user, ALL_ID)
    }
}

impl UserEntity for LastViewed {
    const KIND: UserKind = UserKind::LastViewed;
    type Key = CourseId;

    fn cache_key(user: &UserId, key: &CourseId) -> CacheKey {
        CacheKey::user_scoped(Self::KIND, user, key.as_str())
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of reads that found an entry.
    pub hits: u64,
    /// Number of reads that found nothing.
    pub misses: u64,
    /// Number of entries currently holding data.
    pub entry_count: u64,
    /// Number of writes.
    pub writes: u64,
    /// Number of entries removed by the retention timer.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
