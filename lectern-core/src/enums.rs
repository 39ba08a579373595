//! Enum types for Lectern entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// PARTITIONS
// ============================================================================

/// Which persistence partition a kind of cached data belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Partition {
    /// Shared, non user-specific data. Survives a session boundary.
    Catalog,
    /// Data scoped to one signed-in identity. Held in memory only.
    User,
}

// ============================================================================
// ENTITY KINDS
// ============================================================================

/// Catalog entity kinds (shared between all users).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CatalogKind {
    /// A single course document.
    Course,
    /// The result of a catalog listing query.
    CourseList,
    /// The ordered lessons of one course.
    Lessons,
    /// An instructor profile.
    Instructor,
    /// Aggregate statistics of one course.
    Stats,
}

/// User-specific entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum UserKind {
    /// Progress of one user through one course.
    Progress,
    /// Notes a user took on one lesson.
    Notes,
    /// Courses a user has purchased.
    Purchases,
    /// Last lesson a user opened in a course.
    LastViewed,
}

/// Entity kind discriminator covering both partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Catalog(CatalogKind),
    User(UserKind),
}

impl CatalogKind {
    /// All catalog kinds, in persistence order.
    pub const ALL: [CatalogKind; 5] = [
        CatalogKind::Course,
        CatalogKind::CourseList,
        CatalogKind::Lessons,
        CatalogKind::Instructor,
        CatalogKind::Stats,
    ];

    /// Key slug. Slugs never contain `_` so keys split unambiguously.
    pub fn slug(self) -> &'static str {
        match self {
            CatalogKind::Course => "course",
            CatalogKind::CourseList => "catalog",
            CatalogKind::Lessons => "lessons",
            CatalogKind::Instructor => "instructor",
            CatalogKind::Stats => "stats",
        }
    }
}

impl UserKind {
    /// All user kinds.
    pub const ALL: [UserKind; 4] = [
        UserKind::Progress,
        UserKind::Notes,
        UserKind::Purchases,
        UserKind::LastViewed,
    ];

    /// Key slug. Slugs never contain `_` so keys split unambiguously.
    pub fn slug(self) -> &'static str {
        match self {
            UserKind::Progress => "progress",
            UserKind::Notes => "notes",
            UserKind::Purchases => "purchases",
            UserKind::LastViewed => "lastviewed",
        }
    }
}

impl EntityKind {
    /// Persistence partition of this kind.
    pub fn partition(self) -> Partition {
        match self {
            EntityKind::Catalog(_) => Partition::Catalog,
            EntityKind::User(_) => Partition::User,
        }
    }

    /// Key slug of this kind.
    pub fn slug(self) -> &'static str {
        match self {
            EntityKind::Catalog(kind) => kind.slug(),
            EntityKind::User(kind) => kind.slug(),
        }
    }

    /// Returns true for user-specific kinds.
    pub fn is_user_specific(self) -> bool {
        matches!(self.partition(), Partition::User)
    }
}

impl From<CatalogKind> for EntityKind {
    fn from(kind: CatalogKind) -> Self {
        EntityKind::Catalog(kind)
    }
}

impl From<UserKind> for EntityKind {
    fn from(kind: UserKind) -> Self {
        EntityKind::User(kind)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl fmt::Display for UserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Error when parsing an unknown kind slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindParseError(pub String);

impl fmt::Display for KindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid entity kind: {}", self.0)
    }
}

impl std::error::Error for KindParseError {}

impl FromStr for CatalogKind {
    type Err = KindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CatalogKind::ALL
            .into_iter()
            .find(|kind| kind.slug() == s)
            .ok_or_else(|| KindParseError(s.to_string()))
    }
}

impl FromStr for UserKind {
    type Err = KindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UserKind::ALL
            .into_iter()
            .find(|kind| kind.slug() == s)
            .ok_or_else(|| KindParseError(s.to_string()))
    }
}

impl FromStr for EntityKind {
    type Err = KindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<CatalogKind>()
            .map(EntityKind::Catalog)
            .or_else(|_| s.parse::<UserKind>().map(EntityKind::User))
    }
}

// ============================================================================
// COURSE ENUMS
// ============================================================================

/// Difficulty level advertised on a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl fmt::Display for CourseLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            CourseLevel::Beginner => "beginner",
            CourseLevel::Intermediate => "intermediate",
            CourseLevel::Advanced => "advanced",
        };
        write!(f, "{}", value)
    }
}
