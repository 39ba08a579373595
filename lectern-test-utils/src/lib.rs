//! Lectern Test Utilities
//!
//! Shared test infrastructure for the Lectern workspace:
//! - Proptest generators for the course entities
//! - Mock document service, identity and storage doubles
//! - Fixtures for courses, lessons and pre-wired stores
//! - Assertions for Lectern results and progress records

pub use lectern_core::{
    completion_percentage, CatalogQuery, Course, CourseId, CourseLevel, CourseStats, EntityIdType,
    EntityKind, FetchError, InstructorId, InstructorProfile, LecternError, LecternResult, Lesson,
    LessonId, Note, NoteId, PersistenceError, Purchase, Timestamp, UserId, UserProgress,
};
pub use lectern_store::{
    AuthIdentity, CacheStore, CachedData, DocumentService, EntityRequest, ManualClock,
    MemoryStorage, StorageAdapter, StoreConfig,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

// ============================================================================
// MOCK DOCUMENT SERVICE
// ============================================================================

#[derive(Debug, Default)]
struct MockState {
    responses: HashMap<EntityRequest, CachedData>,
    calls: HashMap<EntityRequest, usize>,
    delay: Option<Duration>,
    fail_fetches: bool,
    fail_saves: bool,
    saved_progress: Vec<UserProgress>,
    saved_notes: Vec<Note>,
}

/// In-memory document service with canned responses and call accounting.
///
/// Unknown requests fail with `FetchError::NotFound`.
#[derive(Debug, Default)]
pub struct MockDocumentService {
    state: Mutex<MockState>,
}

impl MockDocumentService {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serve `data` for `request`.
    pub fn with_response(self, request: EntityRequest, data: CachedData) -> Self {
        self.insert(request, data);
        self
    }

    /// Serve a course and its lesson list.
    pub fn with_course(self, course: Course, lessons: Vec<Lesson>) -> Self {
        let id = course.id.clone();
        self.with_response(EntityRequest::Course(id.clone()), CachedData::Course(course))
            .with_response(EntityRequest::Lessons(id), CachedData::Lessons(lessons))
    }

    /// Sleep this long inside every fetch before answering.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.state().delay = Some(delay);
        self
    }

    pub fn insert(&self, request: EntityRequest, data: CachedData) {
        self.state().responses.insert(request, data);
    }

    pub fn set_fail_fetches(&self, fail: bool) {
        self.state().fail_fetches = fail;
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.state().fail_saves = fail;
    }

    /// Number of fetches seen for `request`.
    pub fn calls(&self, request: &EntityRequest) -> usize {
        self.state().calls.get(request).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state().calls.values().sum()
    }

    pub fn saved_progress(&self) -> Vec<UserProgress> {
        self.state().saved_progress.clone()
    }

    pub fn saved_notes(&self) -> Vec<Note> {
        self.state().saved_notes.clone()
    }
}

#[async_trait]
impl DocumentService for MockDocumentService {
    async fn fetch_entity(&self, request: &EntityRequest) -> LecternResult<CachedData> {
        let (delay, fail, response) = {
            let mut state = self.state();
            *state.calls.entry(request.clone()).or_insert(0) += 1;
            (state.delay, state.fail_fetches, state.responses.get(request).cloned())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(FetchError::Rejected {
                kind: request.kind(),
                reason: "injected failure".to_string(),
            }
            .into());
        }
        response.ok_or_else(|| {
            FetchError::NotFound {
                kind: request.kind(),
                id: request.cache_key().id().to_string(),
            }
            .into()
        })
    }

    async fn save_progress(&self, progress: &UserProgress) -> LecternResult<()> {
        let mut state = self.state();
        if state.fail_saves {
            return Err(FetchError::Rejected {
                kind: EntityKind::User(lectern_core::UserKind::Progress),
                reason: "injected failure".to_string(),
            }
            .into());
        }
        state.saved_progress.push(progress.clone());
        Ok(())
    }

    async fn save_note(&self, note: &Note) -> LecternResult<()> {
        let mut state = self.state();
        if state.fail_saves {
            return Err(FetchError::Rejected {
                kind: EntityKind::User(lectern_core::UserKind::Notes),
                reason: "injected failure".to_string(),
            }
            .into());
        }
        state.saved_notes.push(note.clone());
        Ok(())
    }
}

// ============================================================================
// IDENTITY AND STORAGE DOUBLES
// ============================================================================

/// Identity provider whose signed-in user is set by the test.
#[derive(Debug, Default)]
pub struct StaticIdentity {
    user: Mutex<Option<UserId>>,
}

impl StaticIdentity {
    pub fn signed_in(user: impl Into<UserId>) -> Self {
        Self {
            user: Mutex::new(Some(user.into())),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, user: impl Into<UserId>) {
        *self.user.lock().unwrap_or_else(PoisonError::into_inner) = Some(user.into());
    }

    pub fn sign_out(&self) {
        *self.user.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl AuthIdentity for StaticIdentity {
    fn current_user_id(&self) -> Option<UserId> {
        self.user.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Storage that rejects every call.
#[derive(Debug, Default)]
pub struct FailingStorage;

impl FailingStorage {
    fn unavailable() -> PersistenceError {
        PersistenceError::Unavailable {
            reason: "storage offline".to_string(),
        }
    }
}

impl StorageAdapter for FailingStorage {
    fn save(&self, _key: &str, _bytes: &[u8]) -> Result<(), PersistenceError> {
        Err(Self::unavailable())
    }

    fn load(&self, _key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        Err(Self::unavailable())
    }

    fn remove(&self, _key: &str) -> Result<(), PersistenceError> {
        Err(Self::unavailable())
    }
}

/// Storage that accepts writes but always loads garbage.
#[derive(Debug, Default)]
pub struct CorruptStorage;

impl StorageAdapter for CorruptStorage {
    fn save(&self, _key: &str, _bytes: &[u8]) -> Result<(), PersistenceError> {
        Ok(())
    }

    fn load(&self, _key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        Ok(Some(b"{not json".to_vec()))
    }

    fn remove(&self, _key: &str) -> Result<(), PersistenceError> {
        Ok(())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Lectern entity types.

    use super::*;
    use proptest::prelude::*;

    // === Identity Type Generators ===

    fn arb_raw_id() -> impl Strategy<Value = String> {
        "[a-z0-9][a-z0-9_-]{0,11}"
    }

    pub fn arb_course_id() -> impl Strategy<Value = CourseId> {
        arb_raw_id().prop_map(CourseId::new)
    }

    pub fn arb_user_id() -> impl Strategy<Value = UserId> {
        arb_raw_id().prop_map(UserId::new)
    }

    pub fn arb_instructor_id() -> impl Strategy<Value = InstructorId> {
        arb_raw_id().prop_map(InstructorId::new)
    }

    /// Generate a Timestamp between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64)
            .prop_map(|secs| DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now))
    }

    // === Enum Generators ===

    pub fn arb_course_level() -> impl Strategy<Value = CourseLevel> {
        prop_oneof![
            Just(CourseLevel::Beginner),
            Just(CourseLevel::Intermediate),
            Just(CourseLevel::Advanced),
        ]
    }

    // === Entity Generators ===

    pub fn arb_course() -> impl Strategy<Value = Course> {
        (
            arb_course_id(),
            "[A-Za-z ]{1,40}",
            arb_instructor_id(),
            prop_oneof![Just("web"), Just("data"), Just("design")],
            arb_course_level(),
            prop_oneof![Just(0u64), 100u64..100_000],
            0usize..60,
            arb_timestamp(),
        )
            .prop_map(
                |(id, title, instructor_id, category, level, price_cents, total_lessons, created_at)| Course {
                    id,
                    title,
                    description: String::new(),
                    instructor_id,
                    category: category.to_string(),
                    level,
                    price_cents,
                    thumbnail_url: None,
                    total_lessons,
                    created_at,
                    updated_at: created_at,
                },
            )
    }

    /// Generate a lesson list for `course` with distinct ids and
    /// strictly increasing `order`. Some lessons have no section.
    pub fn arb_lessons(course: CourseId, max: usize) -> impl Strategy<Value = Vec<Lesson>> {
        prop::collection::vec(
            (
                prop::option::of(prop_oneof![Just("Basics"), Just("Advanced"), Just("Extras")]),
                1u32..90,
            ),
            0..=max,
        )
        .prop_map(move |specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(i, (section, duration_minutes))| Lesson {
                    id: LessonId::new(format!("{}-l{}", course, i)),
                    course_id: course.clone(),
                    title: format!("Lesson {}", i + 1),
                    section: section.map(str::to_string),
                    order: i as u32 + 1,
                    duration_minutes,
                    video_url: None,
                    content: None,
                })
                .collect()
        })
    }

    pub fn arb_catalog_query() -> impl Strategy<Value = CatalogQuery> {
        (
            prop::option::of(prop_oneof![Just("web"), Just("data")]),
            prop::option::of(arb_course_level()),
            prop::option::of(arb_instructor_id()),
            prop::option::of("[A-Za-z ]{0,12}"),
            prop::option::of(prop_oneof![Just("newest"), Just("popular")]),
        )
            .prop_map(|(category, level, instructor_id, search, sort)| CatalogQuery {
                category: category.map(str::to_string),
                level,
                instructor_id,
                search,
                sort: sort.map(str::to_string),
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;

    /// Fixed instant used as the start of every manual clock.
    pub fn epoch() -> Timestamp {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_else(Utc::now)
    }

    /// A paid course with `total_lessons` lessons.
    pub fn course(id: &str, price_cents: u64, total_lessons: usize) -> Course {
        Course {
            id: CourseId::new(id),
            title: format!("Course {}", id),
            description: "A test course".to_string(),
            instructor_id: InstructorId::new("inst-1"),
            category: "web".to_string(),
            level: CourseLevel::Beginner,
            price_cents,
            thumbnail_url: None,
            total_lessons,
            created_at: epoch(),
            updated_at: epoch(),
        }
    }

    pub fn free_course(id: &str, total_lessons: usize) -> Course {
        course(id, 0, total_lessons)
    }

    /// `count` lessons in order. Lessons are spread over "Basics" and
    /// "Advanced"; every fifth one has no section.
    pub fn lessons(course: &CourseId, count: usize) -> Vec<Lesson> {
        (0..count)
            .map(|i| Lesson {
                id: LessonId::new(format!("{}-l{}", course, i + 1)),
                course_id: course.clone(),
                title: format!("Lesson {}", i + 1),
                section: match i % 5 {
                    4 => None,
                    n if n < 2 => Some("Basics".to_string()),
                    _ => Some("Advanced".to_string()),
                },
                order: i as u32 + 1,
                duration_minutes: 10,
                video_url: None,
                content: None,
            })
            .collect()
    }

    pub fn instructor(id: &str) -> InstructorProfile {
        InstructorProfile {
            id: InstructorId::new(id),
            display_name: format!("Instructor {}", id),
            bio: None,
            expertise: vec!["rust".to_string()],
            avatar_url: None,
        }
    }

    pub fn stats(course: &CourseId) -> CourseStats {
        CourseStats {
            course_id: course.clone(),
            enrolled_students: 42,
            completion_count: 7,
            average_rating: 4.5,
            review_count: 12,
            revenue_cents: 420_000,
        }
    }

    pub fn note(id: &str, user: &UserId, lesson: &LessonId, content: &str) -> Note {
        Note {
            id: NoteId::new(id),
            lesson_id: lesson.clone(),
            user_id: user.clone(),
            content: content.to_string(),
            video_timestamp_secs: None,
            created_at: epoch(),
        }
    }

    pub fn purchase(user: &UserId, course: &CourseId) -> Purchase {
        Purchase {
            user_id: user.clone(),
            course_id: course.clone(),
            amount_cents: 4_900,
            purchased_at: epoch(),
        }
    }

    /// Store driven by a manual clock starting at [`epoch`].
    ///
    /// Panics when `config` does not validate.
    pub fn manual_store(config: StoreConfig) -> (CacheStore, ManualClock) {
        let clock = ManualClock::new(epoch());
        let store = CacheStore::builder()
            .config(config)
            .clock(clock.clone())
            .build()
            .unwrap_or_else(|e| panic!("invalid store config: {e}"));
        (store, clock)
    }

    /// Store driven by a manual clock and backed by `storage`.
    pub fn persistent_store(config: StoreConfig, storage: Arc<dyn StorageAdapter>) -> (CacheStore, ManualClock) {
        let clock = ManualClock::new(epoch());
        let store = CacheStore::builder()
            .config(config)
            .clock(clock.clone())
            .storage(storage)
            .build()
            .unwrap_or_else(|e| panic!("invalid store config: {e}"));
        (store, clock)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for Lectern-specific validation.

    use super::*;

    #[track_caller]
    pub fn assert_fetch_error<T: std::fmt::Debug>(result: &LecternResult<T>) {
        match result {
            Err(LecternError::Fetch(_)) => {}
            other => panic!("Expected Fetch error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_persistence_error<T: std::fmt::Debug>(result: &LecternResult<T>) {
        match result {
            Err(LecternError::Persistence(_)) => {}
            other => panic!("Expected Persistence error, got: {:?}", other),
        }
    }

    /// Assert the stored percentage agrees with the completed set.
    #[track_caller]
    pub fn assert_progress_consistent(progress: &UserProgress) {
        let expected = completion_percentage(progress.completed_lessons.len(), progress.total_lessons);
        assert_eq!(
            progress.percentage, expected,
            "percentage {} does not match {}/{} completed",
            progress.percentage,
            progress.completed_lessons.len(),
            progress.total_lessons
        );
        assert!(progress.percentage <= 100);
    }
}

// ============================================================================
// TESTS
// ============================================================================
