//! Previous/next lesson navigation.

use lectern_core::{Lesson, LessonId};
use serde::{Deserialize, Serialize};

/// Lesson currently shown plus its neighbours in course order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LessonNavigation {
    pub current: Option<Lesson>,
    pub prev: Option<Lesson>,
    pub next: Option<Lesson>,
}

/// Locate `current_id` in `lessons` and return its neighbours.
///
/// When the id is not in the list the supplied `fallback` becomes the current
/// lesson, and neighbours are taken relative to the fallback's own position
/// (none if it is not listed either). `lessons == None` yields no neighbours.
pub fn lesson_navigation(
    current_id: &LessonId,
    lessons: Option<&[Lesson]>,
    fallback: Option<&Lesson>,
) -> LessonNavigation {
    let Some(lessons) = lessons else {
        return LessonNavigation {
            current: fallback.cloned(),
            ..Default::default()
        };
    };

    let index = position(lessons, current_id)
        .or_else(|| fallback.and_then(|lesson| position(lessons, &lesson.id)));

    match index {
        Some(i) => LessonNavigation {
            current: Some(lessons[i].clone()),
            prev: i.checked_sub(1).map(|p| lessons[p].clone()),
            next: lessons.get(i + 1).cloned(),
        },
        None => LessonNavigation {
            current: fallback.cloned(),
            ..Default::default()
        },
    }
}

fn position(lessons: &[Lesson], id: &LessonId) -> Option<usize> {
    lessons.iter().position(|lesson| &lesson.id == id)
}
