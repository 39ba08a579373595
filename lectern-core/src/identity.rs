//! Identity types for Lectern entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Common behaviour of the document-id newtypes.
///
/// Document-database ids are opaque strings, so every id type is a thin
/// wrapper that only adds type safety at call sites.
pub trait EntityIdType: Clone + Eq + std::hash::Hash + fmt::Display {
    /// Wrap a raw document id.
    fn new(raw: impl Into<String>) -> Self;

    /// Borrow the raw document id.
    fn as_str(&self) -> &str;
}

macro_rules! define_entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl EntityIdType for $name {
            fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_string())
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_entity_id!(
    /// Identifier of a course document.
    CourseId
);
define_entity_id!(
    /// Identifier of a lesson document.
    LessonId
);
define_entity_id!(
    /// Identifier of a signed-in user.
    UserId
);
define_entity_id!(
    /// Identifier of a note document.
    NoteId
);
define_entity_id!(
    /// Identifier of an instructor profile.
    InstructorId
);
