//! Typed entity repositories over the cache store.
//!
//! Each repository fixes one payload type and derives its cache key from the
//! entity id, so callers never build `"<kind>_<id>"` strings themselves.
//! Repositories never perform network I/O.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use lectern_core::{
    Course, CourseId, CourseStats, InstructorProfile, LastViewed, Lesson, LessonId, Note,
    Purchase, UserId, UserProgress,
};

use crate::cache::{CacheKey, CacheStore, CachedData, CatalogEntity, Subscription, UserEntity};

// ============================================================================
// CATALOG
// ============================================================================

/// Repository for one kind of shared catalog data.
pub struct CatalogRepository<T: CatalogEntity> {
    store: CacheStore,
    _entity: PhantomData<fn() -> T>,
}

impl<T: CatalogEntity> CatalogRepository<T> {
    pub fn new(store: CacheStore) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    pub fn key(&self, id: &T::Key) -> CacheKey {
        T::cache_key(id)
    }

    pub fn get(&self, id: &T::Key) -> Option<T> {
        let data = self.store.get(&self.key(id))?;
        T::from_data(&data).cloned()
    }

    pub fn set(&self, id: &T::Key, value: T) -> Arc<CachedData> {
        self.store.set(self.key(id), value.into_data())
    }

    pub fn is_stale(&self, id: &T::Key, max_age: Option<Duration>) -> bool {
        self.store.is_stale(&self.key(id), max_age)
    }

    /// Typed subscription. Writes of another payload kind are ignored.
    pub fn subscribe<F>(&self, id: &T::Key, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.store.subscribe(&self.key(id), move |data| {
            if let Some(value) = T::from_data(data) {
                callback(value);
            }
        })
    }
}

impl<T: CatalogEntity> Clone for CatalogRepository<T> {
    fn clone(&self) -> Self {
        Self::new(self.store.clone())
    }
}

impl<T: CatalogEntity> fmt::Debug for CatalogRepository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogRepository")
            .field("kind", &T::KIND)
            .finish()
    }
}

// ============================================================================
// USER-SCOPED
// ============================================================================

/// Repository for one kind of user-scoped data.
pub struct UserRepository<T: UserEntity> {
    store: CacheStore,
    _entity: PhantomData<fn() -> T>,
}

impl<T: UserEntity> UserRepository<T> {
    pub fn new(store: CacheStore) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    pub fn key(&self, user: &UserId, id: &T::Key) -> CacheKey {
        T::cache_key(user, id)
    }

    pub fn get(&self, user: &UserId, id: &T::Key) -> Option<T> {
        let data = self.store.get(&self.key(user, id))?;
        T::from_data(&data).cloned()
    }

    pub fn set(&self, user: &UserId, id: &T::Key, value: T) -> Arc<CachedData> {
        self.store.set(self.key(user, id), value.into_data())
    }

    pub fn is_stale(&self, user: &UserId, id: &T::Key, max_age: Option<Duration>) -> bool {
        self.store.is_stale(&self.key(user, id), max_age)
    }

    /// Keep the cached value but force the next read to refetch it.
    pub fn invalidate(&self, user: &UserId, id: &T::Key) -> bool {
        self.store.invalidate(&self.key(user, id))
    }

    pub fn subscribe<F>(&self, user: &UserId, id: &T::Key, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.store.subscribe(&self.key(user, id), move |data| {
            if let Some(value) = T::from_data(data) {
                callback(value);
            }
        })
    }
}

impl<T: UserEntity> Clone for UserRepository<T> {
    fn clone(&self) -> Self {
        Self::new(self.store.clone())
    }
}

impl<T: UserEntity> fmt::Debug for UserRepository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRepository")
            .field("kind", &T::KIND)
            .finish()
    }
}

// ============================================================================
// BUNDLE
// ============================================================================

/// One repository per entity kind, all sharing a store.
#[derive(Debug, Clone)]
pub struct Repositories {
    pub courses: CatalogRepository<Course>,
    pub course_lists: CatalogRepository<Vec<Course>>,
    pub lessons: CatalogRepository<Vec<Lesson>>,
    pub instructors: CatalogRepository<InstructorProfile>,
    pub stats: CatalogRepository<CourseStats>,
    pub progress: UserRepository<UserProgress>,
    pub notes: UserRepository<Vec<Note>>,
    pub purchases: UserRepository<Vec<Purchase>>,
    pub last_viewed: UserRepository<LastViewed>,
    store: CacheStore,
}

impl Repositories {
    pub fn new(store: CacheStore) -> Self {
        Self {
            courses: CatalogRepository::new(store.clone()),
            course_lists: CatalogRepository::new(store.clone()),
            lessons: CatalogRepository::new(store.clone()),
            instructors: CatalogRepository::new(store.clone()),
            stats: CatalogRepository::new(store.clone()),
            progress: UserRepository::new(store.clone()),
            notes: UserRepository::new(store.clone()),
            purchases: UserRepository::new(store.clone()),
            last_viewed: UserRepository::new(store.clone()),
            store,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Merge a completed lesson into the user's progress for a course.
    ///
    /// With `lessons` supplied, ids that are not lessons of the course are
    /// ignored and previously stored unknown ids are dropped. Nothing is
    /// written when the merge changes nothing, so repeating a completion does
    /// not notify subscribers again.
    pub fn mark_lesson_complete(
        &self,
        user: &UserId,
        course: &CourseId,
        lesson: &LessonId,
        lessons: Option<&[Lesson]>,
    ) -> UserProgress {
        let now = self.store.now();
        let existing = self.progress.get(user, course);
        let total = match lessons {
            Some(lessons) => lessons.len(),
            None => existing
                .as_ref()
                .map(|p| p.total_lessons)
                .or_else(|| self.courses.get(course).map(|c| c.total_lessons))
                .unwrap_or(0),
        };

        let mut progress = existing
            .clone()
            .unwrap_or_else(|| UserProgress::new(user.clone(), course.clone(), total, now));
        progress.set_total_lessons(total);

        let known = match lessons {
            Some(lessons) => {
                progress.retain_known(lessons.iter().map(|l| &l.id));
                lessons.iter().any(|l| &l.id == lesson)
            }
            None => true,
        };
        if known {
            progress.mark_complete(lesson.clone(), now);
        } else {
            tracing::debug!(lesson = %lesson, course = %course, "ignoring completion of unknown lesson");
        }

        if existing.as_ref() != Some(&progress) {
            self.progress.set(user, course, progress.clone());
        }
        progress
    }

    /// Replace the note with the same id, or append it. Creation order is kept.
    pub fn upsert_note(&self, user: &UserId, note: Note) -> Vec<Note> {
        let lesson = note.lesson_id.clone();
        let mut notes = self.notes.get(user, &lesson).unwrap_or_default();
        match notes.iter_mut().find(|n| n.id == note.id) {
            Some(existing) => *existing = note,
            None => notes.push(note),
        }
        self.notes.set(user, &lesson, notes.clone());
        notes
    }

    /// Record a purchase. Returns false when the course was already purchased.
    pub fn record_purchase(&self, user: &UserId, purchase: Purchase) -> bool {
        let mut purchases = self.purchases.get(user, &()).unwrap_or_default();
        if purchases.iter().any(|p| p.course_id == purchase.course_id) {
            return false;
        }
        purchases.push(purchase);
        self.purchases.set(user, &(), purchases);
        true
    }

    /// Boolean access check against the cached purchases.
    pub fn has_purchased(&self, user: &UserId, course: &CourseId) -> bool {
        self.purchases
            .get(user, &())
            .is_some_and(|purchases| purchases.iter().any(|p| &p.course_id == course))
    }

    /// Remember the last lesson the user opened in a course.
    pub fn record_last_viewed(&self, user: &UserId, course: &CourseId, lesson: &LessonId) -> LastViewed {
        let viewed = LastViewed {
            user_id: user.clone(),
            course_id: course.clone(),
            lesson_id: lesson.clone(),
            viewed_at: self.store.now(),
        };
        self.last_viewed.set(user, course, viewed.clone());
        viewed
    }
}
