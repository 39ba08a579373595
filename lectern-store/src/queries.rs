//! Fetch orchestration for the course platform.
//!
//! `CourseQueries` ties the repositories, the deduplicator and the external
//! services together. Reads go through the deduplicator keyed by the entity's
//! cache key. User-scoped operations return `None` when nobody is signed in.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use lectern_core::{
    CatalogQuery, Course, CourseId, CourseStats, InstructorId, InstructorProfile, LecternResult,
    Lesson, LessonId, LastViewed, Note, Purchase, UserId, UserProgress,
};

use crate::cache::{CacheStore, CachedEntity};
use crate::dedup::QueryDeduplicator;
use crate::repository::Repositories;
use crate::service::{AuthIdentity, DocumentService, EntityRequest};

/// Cached, deduplicated access to course data.
#[derive(Clone)]
pub struct CourseQueries {
    repos: Repositories,
    dedup: QueryDeduplicator,
    service: Arc<dyn DocumentService>,
    identity: Arc<dyn AuthIdentity>,
    max_age: Option<Duration>,
}

impl CourseQueries {
    pub fn new(store: CacheStore, service: Arc<dyn DocumentService>, identity: Arc<dyn AuthIdentity>) -> Self {
        Self {
            repos: Repositories::new(store.clone()),
            dedup: QueryDeduplicator::new(store),
            service,
            identity,
            max_age: None,
        }
    }

    /// Override the staleness window for every read made through this handle.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    pub fn deduplicator(&self) -> &QueryDeduplicator {
        &self.dedup
    }

    pub fn store(&self) -> &CacheStore {
        self.repos.store()
    }

    fn current_user(&self) -> Option<UserId> {
        self.identity.current_user_id()
    }

    async fn load<T: CachedEntity>(&self, request: EntityRequest) -> Option<T> {
        let key = request.cache_key();
        let service = Arc::clone(&self.service);
        self.dedup
            .fetch_as(key, self.max_age, move || async move {
                service.fetch_entity(&request).await
            })
            .await
    }

    // ------------------------------------------------------------------------
    // Catalog reads
    // ------------------------------------------------------------------------

    pub async fn course(&self, id: &CourseId) -> Option<Course> {
        self.load(EntityRequest::Course(id.clone())).await
    }

    pub async fn catalog(&self, query: &CatalogQuery) -> Option<Vec<Course>> {
        self.load(EntityRequest::Catalog(query.clone())).await
    }

    pub async fn lessons(&self, course: &CourseId) -> Option<Vec<Lesson>> {
        self.load(EntityRequest::Lessons(course.clone())).await
    }

    pub async fn instructor(&self, id: &InstructorId) -> Option<InstructorProfile> {
        self.load(EntityRequest::Instructor(id.clone())).await
    }

    pub async fn stats(&self, course: &CourseId) -> Option<CourseStats> {
        self.load(EntityRequest::Stats(course.clone())).await
    }

    // ------------------------------------------------------------------------
    // User reads
    // ------------------------------------------------------------------------

    pub async fn progress(&self, course: &CourseId) -> Option<UserProgress> {
        let user = self.current_user()?;
        self.load(EntityRequest::Progress {
            user,
            course: course.clone(),
        })
        .await
    }

    pub async fn notes(&self, lesson: &LessonId) -> Option<Vec<Note>> {
        let user = self.current_user()?;
        self.load(EntityRequest::Notes {
            user,
            lesson: lesson.clone(),
        })
        .await
    }

    pub async fn purchases(&self) -> Option<Vec<Purchase>> {
        let user = self.current_user()?;
        self.load(EntityRequest::Purchases { user }).await
    }

    /// Whether the signed-in user may open the course: free courses are open
    /// to everyone signed in, paid ones need a purchase.
    pub async fn has_access(&self, course: &CourseId) -> bool {
        if self.current_user().is_none() {
            return false;
        }
        if self.course(course).await.is_some_and(|c| c.price_cents == 0) {
            return true;
        }
        self.purchases()
            .await
            .is_some_and(|purchases| purchases.iter().any(|p| &p.course_id == course))
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Mark a lesson complete for the signed-in user and save the progress.
    ///
    /// The stored progress is loaded first so the completion merges into the
    /// server copy instead of replacing it. The cache is updated before the
    /// save. A failed save is logged; the merged progress is still returned.
    pub async fn complete_lesson(&self, course: &CourseId, lesson: &LessonId) -> Option<UserProgress> {
        let user = self.current_user()?;
        let lessons = self.lessons(course).await;
        self.progress(course).await;
        let loaded = !self.repos.progress.is_stale(&user, course, self.max_age);

        let progress = self
            .repos
            .mark_lesson_complete(&user, course, lesson, lessons.as_deref());
        if !loaded {
            // Merged without the server copy; refetch on the next read.
            self.repos.progress.invalidate(&user, course);
        }
        if let Err(e) = self.service.save_progress(&progress).await {
            tracing::warn!(course = %course, lesson = %lesson, error = %e, "failed to save progress");
        }
        Some(progress)
    }

    /// Add or edit a note for the signed-in user.
    ///
    /// The lesson's notes are loaded first so the new note joins the existing
    /// list. The note is saved to the document service and only cached once
    /// the save succeeds.
    pub async fn add_note(&self, note: Note) -> LecternResult<Option<Vec<Note>>> {
        let Some(user) = self.current_user() else {
            return Ok(None);
        };
        let note = Note {
            user_id: user.clone(),
            ..note
        };
        let lesson = note.lesson_id.clone();
        self.notes(&lesson).await;
        let loaded = !self.repos.notes.is_stale(&user, &lesson, self.max_age);

        self.service.save_note(&note).await?;
        let notes = self.repos.upsert_note(&user, note);
        if !loaded {
            self.repos.notes.invalidate(&user, &lesson);
        }
        Ok(Some(notes))
    }

    /// Remember the lesson the signed-in user just opened.
    pub fn open_lesson(&self, course: &CourseId, lesson: &LessonId) -> Option<LastViewed> {
        let user = self.current_user()?;
        Some(self.repos.record_last_viewed(&user, course, lesson))
    }

    /// Drop every user-scoped entry. Returns the number of cleared entries.
    pub fn sign_out(&self) -> usize {
        self.store().clear_user_data()
    }
}

impl fmt::Debug for CourseQueries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CourseQueries")
            .field("store", self.store())
            .field("max_age", &self.max_age)
            .finish()
    }
}
