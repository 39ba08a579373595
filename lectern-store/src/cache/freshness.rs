//! Freshness metadata for cache reads.
//!
//! Staleness is judged against a caller-supplied `max_age`: an entry is stale
//! when it has no timestamp or when `now - cached_at > max_age`.

use std::sync::Arc;
use std::time::Duration;

use lectern_core::Timestamp;

use super::value::CachedData;
use crate::clock::elapsed_between;

/// Returns true when an entry stamped `cached_at` is older than `max_age` at `now`.
///
/// A missing timestamp (never written, or invalidated) is always stale.
pub fn is_stale_at(cached_at: Option<Timestamp>, now: Timestamp, max_age: Duration) -> bool {
    match cached_at {
        Some(cached_at) => elapsed_between(cached_at, now) > max_age,
        None => true,
    }
}

/// Result of a cache read, carrying staleness metadata.
#[derive(Debug, Clone)]
pub struct CacheRead {
    value: Arc<CachedData>,
    cached_at: Option<Timestamp>,
    read_at: Timestamp,
}

impl CacheRead {
    pub(crate) fn new(value: Arc<CachedData>, cached_at: Option<Timestamp>, read_at: Timestamp) -> Self {
        Self {
            value,
            cached_at,
            read_at,
        }
    }

    pub fn value(&self) -> &Arc<CachedData> {
        &self.value
    }

    pub fn into_value(self) -> Arc<CachedData> {
        self.value
    }

    /// When the value was written, `None` once invalidated.
    pub fn cached_at(&self) -> Option<Timestamp> {
        self.cached_at
    }

    /// Write time as epoch milliseconds.
    pub fn cached_at_millis(&self) -> Option<i64> {
        self.cached_at.map(|t| t.timestamp_millis())
    }

    /// Age of the value at read time, `None` once invalidated.
    pub fn staleness(&self) -> Option<Duration> {
        self.cached_at.map(|t| elapsed_between(t, self.read_at))
    }

    pub fn is_stale(&self, max_age: Duration) -> bool {
        is_stale_at(self.cached_at, self.read_at, max_age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn later(t: Timestamp, secs: i64) -> Timestamp {
        t + chrono::Duration::seconds(secs)
    }

    #[test]
    fn test_missing_timestamp_is_stale() {
        assert!(is_stale_at(None, Utc::now(), Duration::from_secs(3600)));
    }

    #[test]
    fn test_stale_only_strictly_after_max_age() {
        let t = Utc::now();
        let max_age = Duration::from_secs(60);
        assert!(!is_stale_at(Some(t), t, max_age));
        assert!(!is_stale_at(Some(t), later(t, 60), max_age));
        assert!(is_stale_at(Some(t), later(t, 61), max_age));
    }

    #[test]
    fn test_cache_read_staleness() {
        let t = Utc::now();
        let read = CacheRead::new(Arc::new(CachedData::Lessons(Vec::new())), Some(t), later(t, 30));
        assert_eq!(read.staleness(), Some(Duration::from_secs(30)));
        assert!(!read.is_stale(Duration::from_secs(60)));
        assert!(read.is_stale(Duration::from_secs(10)));
        assert_eq!(read.cached_at_millis(), Some(t.timestamp_millis()));
    }

    #[test]
    fn test_invalidated_read_has_no_staleness() {
        let read = CacheRead::new(Arc::new(CachedData::Notes(Vec::new())), None, Utc::now());
        assert!(read.staleness().is_none());
        assert!(read.is_stale(Duration::MAX));
    }
}
