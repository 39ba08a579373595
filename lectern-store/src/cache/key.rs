//! Partition-explicit cache keys.
//!
//! `CacheKey`'s private inner struct means a key can only be built through a
//! constructor that names its partition: catalog keys never carry a user and
//! user-scoped keys always do. Equality and hashing are structural, so two
//! keys are the same entry exactly when kind, user and id all match.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use lectern_core::{CatalogKind, EntityIdType, EntityKind, Partition, UserId, UserKind};

/// Key of one entry in the cache store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey {
    inner: KeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct KeyInner {
    kind: EntityKind,
    user: Option<UserId>,
    id: String,
}

impl CacheKey {
    /// Key for shared catalog data.
    pub fn catalog(kind: CatalogKind, id: impl Into<String>) -> Self {
        Self {
            inner: KeyInner {
                kind: EntityKind::Catalog(kind),
                user: None,
                id: id.into(),
            },
        }
    }

    /// Key for data owned by one user.
    pub fn user_scoped(kind: UserKind, user: &UserId, id: impl Into<String>) -> Self {
        Self {
            inner: KeyInner {
                kind: EntityKind::User(kind),
                user: Some(user.clone()),
                id: id.into(),
            },
        }
    }

    /// Key for a parameterized catalog query.
    ///
    /// Parameters are sorted by name and escaped, so the same set of
    /// parameters in any order yields the same key. A repeated name keeps
    /// its last value.
    pub fn query<I, K, V>(kind: CatalogKind, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self::catalog(kind, canonical_query(params))
    }

    pub fn kind(&self) -> EntityKind {
        self.inner.kind
    }

    pub fn partition(&self) -> Partition {
        self.inner.kind.partition()
    }

    pub fn is_catalog(&self) -> bool {
        self.partition() == Partition::Catalog
    }

    /// Owning user of a user-scoped key.
    pub fn user(&self) -> Option<&UserId> {
        self.inner.user.as_ref()
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.user {
            None => write!(f, "{}_{}", self.inner.kind.slug(), self.inner.id),
            Some(user) => write!(
                f,
                "{}_{}_{}",
                self.inner.kind.slug(),
                escape(user.as_str(), true),
                self.inner.id
            ),
        }
    }
}

/// Error returned when a string is not the display form of a catalog key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid catalog cache key: {0}")]
pub struct KeyParseError(String);

/// Parses the display form of catalog keys only. User-scoped keys are never
/// read back from text.
impl FromStr for CacheKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (slug, id) = s.split_once('_').ok_or_else(|| KeyParseError(s.to_string()))?;
        let kind = slug
            .parse::<CatalogKind>()
            .map_err(|_| KeyParseError(s.to_string()))?;
        Ok(Self::catalog(kind, id))
    }
}

fn canonical_query<I, K, V>(params: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let sorted: BTreeMap<String, String> = params
        .into_iter()
        .map(|(k, v)| (escape(k.as_ref(), false), escape(v.as_ref(), false)))
        .collect();
    sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Percent-escape the characters that delimit key segments.
fn escape(raw: &str, underscore: bool) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            '=' => out.push_str("%3D"),
            '_' if underscore => out.push_str("%5F"),
            c => out.push(c),
        }
    }
    out
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_key_display() {
        let key = CacheKey::catalog(CatalogKind::Course, "abc");
        assert_eq!(key.to_string(), "course_abc");
        assert_eq!(key.partition(), Partition::Catalog);
        assert!(key.user().is_none());
    }

    #[test]
    fn test_user_key_display() {
        let user = UserId::new("u_1");
        let key = CacheKey::user_scoped(UserKind::Progress, &user, "c1");
        assert_eq!(key.to_string(), "progress_u%5F1_c1");
        assert_eq!(key.partition(), Partition::User);
        assert_eq!(key.user(), Some(&user));
    }

    #[test]
    fn test_same_id_different_partitions_are_distinct() {
        let user = UserId::new("u1");
        let catalog = CacheKey::catalog(CatalogKind::Course, "c1");
        let scoped = CacheKey::user_scoped(UserKind::Progress, &user, "c1");
        assert_ne!(catalog, scoped);
    }

    #[test]
    fn test_catalog_key_parses_back() {
        let key = CacheKey::catalog(CatalogKind::Lessons, "course_with_underscores");
        let parsed: CacheKey = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_user_key_does_not_parse() {
        assert!("progress_u1_c1".parse::<CacheKey>().is_err());
        assert!("nounderscore".parse::<CacheKey>().is_err());
    }

    #[test]
    fn test_query_key_ignores_parameter_order() {
        let a = CacheKey::query(CatalogKind::CourseList, [("level", "beginner"), ("category", "web")]);
        let b = CacheKey::query(CatalogKind::CourseList, [("category", "web"), ("level", "beginner")]);
        assert_eq!(a, b);
        assert_eq!(a.id(), "category=web&level=beginner");
    }

    #[test]
    fn test_query_escaping_prevents_collisions() {
        let a = CacheKey::query(CatalogKind::CourseList, [("q", "a&b=c")]);
        let b = CacheKey::query(CatalogKind::CourseList, [("q", "a"), ("b", "c")]);
        assert_ne!(a, b);
    }
}
