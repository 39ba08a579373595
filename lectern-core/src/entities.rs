//! Core entity structures

use crate::{CourseId, CourseLevel, InstructorId, LessonId, NoteId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Percentage of `completed` out of `total`, rounded half-up.
///
/// Returns 0 when `total == 0` and never exceeds 100.
pub fn completion_percentage(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total) as u64;
    let total = total as u64;
    // round(100 * c / t) == floor((200 * c + t) / (2 * t))
    ((200 * completed + total) / (2 * total)) as u8
}

/// Course - top-level catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub title: String,
    pub description: String,
    pub instructor_id: InstructorId,
    pub category: String,
    pub level: CourseLevel,
    pub price_cents: u64,
    pub thumbnail_url: Option<String>,
    pub total_lessons: usize,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Filter for a catalog listing query.
///
/// Unset fields are omitted from the query parameters, so two queries that
/// set the same filters always produce the same cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CatalogQuery {
    pub category: Option<String>,
    pub level: Option<CourseLevel>,
    pub instructor_id: Option<InstructorId>,
    pub search: Option<String>,
    pub sort: Option<String>,
}

impl CatalogQuery {
    /// Query parameters of the set filters.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(category) = &self.category {
            params.push(("category", category.clone()));
        }
        if let Some(level) = self.level {
            params.push(("level", level.to_string()));
        }
        if let Some(instructor_id) = &self.instructor_id {
            params.push(("instructor", instructor_id.to_string()));
        }
        if let Some(search) = &self.search {
            params.push(("search", search.trim().to_lowercase()));
        }
        if let Some(sort) = &self.sort {
            params.push(("sort", sort.clone()));
        }
        params
    }
}

/// Lesson - one unit of a course, ordered within it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: LessonId,
    pub course_id: CourseId,
    pub title: String,
    /// Section label used to group lessons; `None` means ungrouped.
    pub section: Option<String>,
    pub order: u32,
    pub duration_minutes: u32,
    pub video_url: Option<String>,
    pub content: Option<String>,
}

/// Progress of one user through one course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProgress {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub completed_lessons: BTreeSet<LessonId>,
    pub total_lessons: usize,
    pub percentage: u8,
    pub last_lesson_id: Option<LessonId>,
    pub updated_at: Timestamp,
}

impl UserProgress {
    /// Create empty progress for a course with `total_lessons` lessons.
    pub fn new(user_id: UserId, course_id: CourseId, total_lessons: usize, now: Timestamp) -> Self {
        Self {
            user_id,
            course_id,
            completed_lessons: BTreeSet::new(),
            total_lessons,
            percentage: 0,
            last_lesson_id: None,
            updated_at: now,
        }
    }

    /// Merge a completed lesson into the set.
    ///
    /// Returns false (and leaves the record untouched) when the lesson was
    /// already complete, so repeated calls are idempotent.
    pub fn mark_complete(&mut self, lesson_id: LessonId, now: Timestamp) -> bool {
        if self.completed_lessons.contains(&lesson_id) {
            return false;
        }
        self.completed_lessons.insert(lesson_id.clone());
        self.last_lesson_id = Some(lesson_id);
        self.updated_at = now;
        self.recompute();
        true
    }

    /// Update the lesson total and recompute the percentage.
    pub fn set_total_lessons(&mut self, total_lessons: usize) {
        self.total_lessons = total_lessons;
        self.recompute();
    }

    /// Drop completed ids that are not lessons of the course.
    pub fn retain_known<'a, I>(&mut self, lesson_ids: I)
    where
        I: IntoIterator<Item = &'a LessonId>,
    {
        let known: BTreeSet<&LessonId> = lesson_ids.into_iter().collect();
        self.completed_lessons.retain(|id| known.contains(id));
        self.recompute();
    }

    /// Re-derive `percentage` from the completed set and total.
    pub fn recompute(&mut self) {
        self.percentage = completion_percentage(self.completed_lessons.len(), self.total_lessons);
    }

    /// Returns true once every lesson is complete.
    pub fn is_completed(&self) -> bool {
        self.percentage == 100
    }
}

/// Note a user attached to a lesson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub lesson_id: LessonId,
    pub user_id: UserId,
    pub content: String,
    /// Position in the lesson video the note refers to.
    pub video_timestamp_secs: Option<u32>,
    pub created_at: Timestamp,
}

/// Public instructor profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructorProfile {
    pub id: InstructorId,
    pub display_name: String,
    pub bio: Option<String>,
    pub expertise: Vec<String>,
    pub avatar_url: Option<String>,
}

/// Aggregate statistics shown on instructor dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseStats {
    pub course_id: CourseId,
    pub enrolled_students: u64,
    pub completion_count: u64,
    pub average_rating: f32,
    pub review_count: u64,
    pub revenue_cents: u64,
}

/// A course purchase made by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub amount_cents: u64,
    pub purchased_at: Timestamp,
}

/// Pointer to the last lesson a user opened in a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastViewed {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub lesson_id: LessonId,
    pub viewed_at: Timestamp,
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// The percentage matches the float definition of round(100 * c / t).
        #[test]
        fn prop_percentage_matches_float_rounding(total in 1usize..500, completed in 0usize..500) {
            let completed = completed.min(total);
            let expected = (100.0 * completed as f64 / total as f64).round() as u8;
            prop_assert_eq!(completion_percentage(completed, total), expected);
        }

        #[test]
        fn prop_percentage_is_bounded(total in 0usize..1000, completed in 0usize..2000) {
            prop_assert!(completion_percentage(completed, total) <= 100);
        }
    }
}
