//! Lectern Views - Derived Lesson State
//!
//! Pure computations over cached course data: previous/next navigation,
//! section grouping and completion metrics. Nothing here reads or mutates the
//! cache store; callers pass plain data and get plain values back.
//!
//! [`ViewMemo`] wraps the three views with value-fingerprint memoization so
//! equal inputs yield the same `Arc` result.

pub mod completion;
pub mod memo;
pub mod navigation;
pub mod sections;

pub use completion::{compute_completion, progress_completion, CompletionMetrics};
pub use memo::{Fingerprint, Fingerprinter, Memo, ViewMemo};
pub use navigation::{lesson_navigation, LessonNavigation};
pub use sections::{group_by_section, section_label, SectionGroup, SectionGroups, DEFAULT_SECTION};
