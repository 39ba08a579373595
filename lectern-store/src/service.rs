//! External collaborators consumed by the fetch layer.
//!
//! The hosted document database and the authentication provider live outside
//! this crate. They are reached only through these traits.

use async_trait::async_trait;
use lectern_core::{
    CatalogQuery, Course, CourseId, CourseStats, EntityKind, InstructorId, InstructorProfile,
    LecternResult, Lesson, LessonId, Note, Purchase, UserId, UserProgress,
};

use crate::cache::{CacheKey, CachedData, CatalogEntity, UserEntity};

/// A read against the document service, naming the entity and its id or query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityRequest {
    Course(CourseId),
    Catalog(CatalogQuery),
    Lessons(CourseId),
    Instructor(InstructorId),
    Stats(CourseId),
    Progress { user: UserId, course: CourseId },
    Notes { user: UserId, lesson: LessonId },
    Purchases { user: UserId },
}

impl EntityRequest {
    pub fn kind(&self) -> EntityKind {
        self.cache_key().kind()
    }

    /// The store key the response is cached under.
    pub fn cache_key(&self) -> CacheKey {
        match self {
            Self::Course(id) => Course::cache_key(id),
            Self::Catalog(query) => <Vec<Course>>::cache_key(query),
            Self::Lessons(course) => <Vec<Lesson>>::cache_key(course),
            Self::Instructor(id) => InstructorProfile::cache_key(id),
            Self::Stats(course) => CourseStats::cache_key(course),
            Self::Progress { user, course } => UserProgress::cache_key(user, course),
            Self::Notes { user, lesson } => <Vec<Note>>::cache_key(user, lesson),
            Self::Purchases { user } => <Vec<Purchase>>::cache_key(user, &()),
        }
    }
}

/// Hosted document database.
#[async_trait]
pub trait DocumentService: Send + Sync {
    /// Fetch the entity named by `request`.
    ///
    /// The returned payload must be the variant matching the request kind.
    async fn fetch_entity(&self, request: &EntityRequest) -> LecternResult<CachedData>;

    async fn save_progress(&self, progress: &UserProgress) -> LecternResult<()>;

    async fn save_note(&self, note: &Note) -> LecternResult<()>;
}

/// Source of the signed-in identity.
pub trait AuthIdentity: Send + Sync {
    fn current_user_id(&self) -> Option<UserId>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_core::{CatalogKind, EntityIdType, UserKind};

    #[test]
    fn test_request_keys_match_repository_keys() {
        let user = UserId::new("u1");
        let request = EntityRequest::Progress {
            user: user.clone(),
            course: CourseId::new("c1"),
        };
        assert_eq!(request.cache_key().to_string(), "progress_u1_c1");
        assert_eq!(request.kind(), EntityKind::User(UserKind::Progress));

        let request = EntityRequest::Lessons(CourseId::new("c1"));
        assert_eq!(request.cache_key(), CacheKey::catalog(CatalogKind::Lessons, "c1"));
    }

    #[test]
    fn test_equivalent_catalog_queries_share_a_key() {
        let a = EntityRequest::Catalog(CatalogQuery {
            category: Some("web".to_string()),
            search: Some("Rust".to_string()),
            ..Default::default()
        });
        let b = EntityRequest::Catalog(CatalogQuery {
            category: Some("web".to_string()),
            search: Some("  rust ".to_string()),
            ..Default::default()
        });
        assert_eq!(a.cache_key(), b.cache_key());
    }
}
