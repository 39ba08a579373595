//! Payloads held by the cache store.

use lectern_core::{
    CatalogKind, Course, CourseStats, EntityKind, InstructorProfile, LastViewed, Lesson, Note,
    Partition, Purchase, UserKind, UserProgress,
};
use serde::{Deserialize, Serialize};

/// One cached entity payload, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum CachedData {
    Course(Course),
    CourseList(Vec<Course>),
    Lessons(Vec<Lesson>),
    Instructor(InstructorProfile),
    Stats(CourseStats),
    Progress(UserProgress),
    Notes(Vec<Note>),
    Purchases(Vec<Purchase>),
    LastViewed(LastViewed),
}

impl CachedData {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Course(_) => CatalogKind::Course.into(),
            Self::CourseList(_) => CatalogKind::CourseList.into(),
            Self::Lessons(_) => CatalogKind::Lessons.into(),
            Self::Instructor(_) => CatalogKind::Instructor.into(),
            Self::Stats(_) => CatalogKind::Stats.into(),
            Self::Progress(_) => UserKind::Progress.into(),
            Self::Notes(_) => UserKind::Notes.into(),
            Self::Purchases(_) => UserKind::Purchases.into(),
            Self::LastViewed(_) => UserKind::LastViewed.into(),
        }
    }

    pub fn partition(&self) -> Partition {
        self.kind().partition()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_core::{CourseId, EntityIdType, InstructorId};

    #[test]
    fn test_kind_matches_variant() {
        let data = CachedData::Lessons(Vec::new());
        assert_eq!(data.kind(), EntityKind::Catalog(CatalogKind::Lessons));
        assert_eq!(data.partition(), Partition::Catalog);
        assert_eq!(CachedData::Notes(Vec::new()).partition(), Partition::User);
    }

    #[test]
    fn test_serde_is_tagged() {
        let data = CachedData::Instructor(InstructorProfile {
            id: InstructorId::new("i1"),
            display_name: "Ada".to_string(),
            bio: None,
            expertise: vec!["rust".to_string()],
            avatar_url: None,
        });
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["kind"], "instructor");
        let back: CachedData = serde_json::from_value(json).unwrap();
        assert_eq!(back, data);

        let stats = CachedData::Stats(CourseStats {
            course_id: CourseId::new("c1"),
            enrolled_students: 3,
            completion_count: 1,
            average_rating: 4.5,
            review_count: 2,
            revenue_cents: 9_900,
        });
        assert_eq!(serde_json::to_value(&stats).unwrap()["kind"], "stats");
    }
}
