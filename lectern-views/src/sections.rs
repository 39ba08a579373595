//! Grouping lessons into their course sections.

use lectern_core::Lesson;
use serde::{Deserialize, Serialize};

/// Label used for lessons that have no section.
pub const DEFAULT_SECTION: &str = "Other Lessons";

/// One section and its lessons, in course order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionGroup {
    pub label: String,
    pub lessons: Vec<Lesson>,
}

/// Lessons partitioned by section label.
///
/// Groups appear in the order their label is first seen.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SectionGroups {
    groups: Vec<SectionGroup>,
}

impl SectionGroups {
    /// Lessons of one section, if any lesson carries that label.
    pub fn get(&self, label: &str) -> Option<&[Lesson]> {
        self.groups
            .iter()
            .find(|group| group.label == label)
            .map(|group| group.lessons.as_slice())
    }

    /// Section labels in display order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|group| group.label.as_str())
    }

    pub fn groups(&self) -> &[SectionGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Partition `lessons` by section, preserving input order inside each group.
pub fn group_by_section(lessons: &[Lesson]) -> SectionGroups {
    let mut groups: Vec<SectionGroup> = Vec::new();

    for lesson in lessons {
        let label = section_label(lesson);
        match groups.iter_mut().find(|group| group.label == label) {
            Some(group) => group.lessons.push(lesson.clone()),
            None => groups.push(SectionGroup {
                label: label.to_string(),
                lessons: vec![lesson.clone()],
            }),
        }
    }

    SectionGroups { groups }
}

/// Section label of a lesson; blank labels count as missing.
pub fn section_label(lesson: &Lesson) -> &str {
    match lesson.section.as_deref() {
        Some(label) if !label.trim().is_empty() => label,
        _ => DEFAULT_SECTION,
    }
}
