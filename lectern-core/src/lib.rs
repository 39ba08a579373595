//! Lectern Core - Entity Types
//!
//! Pure data structures for the course cache. All other crates depend on this.
//! This crate contains ONLY data types and the shared completion rule - no I/O.

pub mod entities;
pub mod enums;
pub mod error;
pub mod identity;

pub use entities::{
    completion_percentage, CatalogQuery, Course, CourseStats, InstructorProfile, LastViewed, Lesson, Note,
    Purchase, UserProgress,
};
pub use enums::{CatalogKind, CourseLevel, EntityKind, KindParseError, Partition, UserKind};
pub use error::{ConfigError, FetchError, LecternError, LecternResult, PersistenceError};
pub use identity::{CourseId, EntityIdType, InstructorId, LessonId, NoteId, Timestamp, UserId};
