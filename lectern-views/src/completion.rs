//! Course completion metrics.

use lectern_core::{completion_percentage, LessonId, UserProgress};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Completion summary displayed next to a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompletionMetrics {
    pub percentage: u8,
    pub is_completed: bool,
    pub lessons_remaining: usize,
}

/// Compute completion metrics. Safe for `total_lessons == 0`.
pub fn compute_completion(completed: &BTreeSet<LessonId>, total_lessons: usize) -> CompletionMetrics {
    let percentage = completion_percentage(completed.len(), total_lessons);
    CompletionMetrics {
        percentage,
        is_completed: percentage == 100,
        lessons_remaining: total_lessons.saturating_sub(completed.len()),
    }
}

/// Metrics of a stored progress record.
pub fn progress_completion(progress: &UserProgress) -> CompletionMetrics {
    compute_completion(&progress.completed_lessons, progress.total_lessons)
}
