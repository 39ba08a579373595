//! Value-fingerprint memoization for derived views.
//!
//! Each view is recomputed only when the SHA-256 fingerprint of its canonical
//! inputs changes. Equal inputs return the same `Arc`, so callers can compare
//! results with `Arc::ptr_eq` to skip redundant re-rendering.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use lectern_core::{EntityIdType, Lesson, LessonId};
use sha2::{Digest, Sha256};

use crate::completion::{compute_completion, CompletionMetrics};
use crate::navigation::{lesson_navigation, LessonNavigation};
use crate::sections::{group_by_section, SectionGroups};

/// SHA-256 digest of a view's inputs.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", hex::encode(&self.0[..8]))
    }
}

/// Incremental builder for a [`Fingerprint`].
///
/// Every field is length-prefixed so adjacent fields cannot run together.
pub struct Fingerprinter {
    hasher: Sha256,
}

impl Fingerprinter {
    /// Start a fingerprint for the named view.
    pub fn new(view: &str) -> Self {
        let mut fp = Self {
            hasher: Sha256::new(),
        };
        fp.str(view);
        fp
    }

    pub fn str(&mut self, value: &str) -> &mut Self {
        self.hasher.update((value.len() as u64).to_le_bytes());
        self.hasher.update(value.as_bytes());
        self
    }

    pub fn opt_str(&mut self, value: Option<&str>) -> &mut Self {
        match value {
            Some(value) => {
                self.hasher.update([1u8]);
                self.str(value)
            }
            None => {
                self.hasher.update([0u8]);
                self
            }
        }
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.hasher.update(value.to_le_bytes());
        self
    }

    /// Hash the lesson fields a view can observe.
    pub fn lesson(&mut self, lesson: &Lesson) -> &mut Self {
        self.str(lesson.id.as_str())
            .str(lesson.course_id.as_str())
            .str(&lesson.title)
            .opt_str(lesson.section.as_deref())
            .u64(u64::from(lesson.order))
            .u64(u64::from(lesson.duration_minutes))
            .opt_str(lesson.video_url.as_deref())
            .opt_str(lesson.content.as_deref())
    }

    pub fn lessons(&mut self, lessons: &[Lesson]) -> &mut Self {
        self.u64(lessons.len() as u64);
        for lesson in lessons {
            self.lesson(lesson);
        }
        self
    }

    pub fn finish(&mut self) -> Fingerprint {
        let digest = std::mem::take(&mut self.hasher).finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Fingerprint(bytes)
    }
}

/// Single-slot memo: keeps the last fingerprint and its result.
pub struct Memo<V> {
    slot: Mutex<Option<(Fingerprint, Arc<V>)>>,
    computations: AtomicU64,
}

impl<V> Default for Memo<V> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
            computations: AtomicU64::new(0),
        }
    }
}

impl<V> Memo<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `fingerprint`, computing it on a miss.
    pub fn get_or_compute<F>(&self, fingerprint: Fingerprint, compute: F) -> Arc<V>
    where
        F: FnOnce() -> V,
    {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((cached, value)) = slot.as_ref() {
            if *cached == fingerprint {
                return Arc::clone(value);
            }
        }
        self.computations.fetch_add(1, Ordering::Relaxed);
        let value = Arc::new(compute());
        *slot = Some((fingerprint, Arc::clone(&value)));
        value
    }

    /// How many times the view has actually been computed.
    pub fn computations(&self) -> u64 {
        self.computations.load(Ordering::Relaxed)
    }
}

/// Memoized versions of the three lesson views.
#[derive(Default)]
pub struct ViewMemo {
    navigation: Memo<LessonNavigation>,
    sections: Memo<SectionGroups>,
    completion: Memo<CompletionMetrics>,
}

impl ViewMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn navigation(
        &self,
        current_id: &LessonId,
        lessons: Option<&[Lesson]>,
        fallback: Option<&Lesson>,
    ) -> Arc<LessonNavigation> {
        let mut fp = Fingerprinter::new("navigation");
        fp.str(current_id.as_str());
        match lessons {
            Some(lessons) => {
                fp.u64(1).lessons(lessons);
            }
            None => {
                fp.u64(0);
            }
        }
        match fallback {
            Some(lesson) => {
                fp.u64(1).lesson(lesson);
            }
            None => {
                fp.u64(0);
            }
        }
        self.navigation.get_or_compute(fp.finish(), || {
            lesson_navigation(current_id, lessons, fallback)
        })
    }

    pub fn sections(&self, lessons: &[Lesson]) -> Arc<SectionGroups> {
        let fingerprint = Fingerprinter::new("sections").lessons(lessons).finish();
        self.sections
            .get_or_compute(fingerprint, || group_by_section(lessons))
    }

    /// Completion keyed on the sorted completed ids plus the total.
    pub fn completion(&self, completed: &BTreeSet<LessonId>, total_lessons: usize) -> Arc<CompletionMetrics> {
        let mut fp = Fingerprinter::new("completion");
        fp.u64(total_lessons as u64).u64(completed.len() as u64);
        for id in completed {
            fp.str(id.as_str());
        }
        self.completion
            .get_or_compute(fp.finish(), || compute_completion(completed, total_lessons))
    }

    /// Total recomputations across all views.
    pub fn computations(&self) -> u64 {
        self.navigation.computations() + self.sections.computations() + self.completion.computations()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_core::CourseId;

    fn lesson(id: &str, section: Option<&str>) -> Lesson {
        Lesson {
            id: LessonId::new(id),
            course_id: CourseId::new("c1"),
            title: id.to_string(),
            section: section.map(str::to_string),
            order: 0,
            duration_minutes: 5,
            video_url: None,
            content: None,
        }
    }

    fn ids(raw: &[&str]) -> BTreeSet<LessonId> {
        raw.iter().map(|id| LessonId::new(*id)).collect()
    }

    #[test]
    fn test_equal_inputs_return_same_arc() {
        let memo = ViewMemo::new();
        let first = memo.completion(&ids(&["a", "b"]), 4);
        // A distinct but equal set must hit the memo.
        let second = memo.completion(&ids(&["b", "a"]), 4);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(memo.computations(), 1);
    }

    #[test]
    fn test_changed_inputs_recompute() {
        let memo = ViewMemo::new();
        let first = memo.completion(&ids(&["a"]), 4);
        let second = memo.completion(&ids(&["a"]), 5);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.percentage, 20);
    }

    #[test]
    fn test_sections_memoized_by_value() {
        let memo = ViewMemo::new();
        let lessons = vec![lesson("1", Some("Intro")), lesson("2", None)];
        let a = memo.sections(&lessons);
        let b = memo.sections(&lessons.clone());
        assert!(Arc::ptr_eq(&a, &b));

        let mut renamed = lessons.clone();
        renamed[1].section = Some("Wrap-up".to_string());
        let c = memo.sections(&renamed);
        assert!(!Arc::ptr_eq(&a, &c));
        assert!(c.get("Wrap-up").is_some());
    }

    #[test]
    fn test_navigation_memo_distinguishes_missing_list() {
        let memo = ViewMemo::new();
        let lessons = vec![lesson("1", None), lesson("2", None)];
        let with_list = memo.navigation(&LessonId::new("1"), Some(&lessons), None);
        let without = memo.navigation(&LessonId::new("1"), None, None);
        assert!(with_list.next.is_some());
        assert!(without.next.is_none());
        assert_eq!(memo.computations(), 2);
    }

    #[test]
    fn test_fingerprint_fields_do_not_run_together() {
        let a = Fingerprinter::new("v").str("ab").str("c").finish();
        let b = Fingerprinter::new("v").str("a").str("bc").finish();
        assert_ne!(a, b);
    }
}
