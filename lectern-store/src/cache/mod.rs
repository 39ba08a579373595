//! Timestamped cache store with per-key subscribers and retention.
//!
//! Entries are addressed by [`CacheKey`], which always states whether it is
//! shared catalog data or data scoped to one user. Reads hand out
//! `Arc<CachedData>` so every reader shares one allocation, and
//! [`CacheRead`] carries the write timestamp for callers that need to judge
//! staleness themselves.
//!
//! # Example
//!
//! ```ignore
//! let store = CacheStore::new(StoreConfig::default())?;
//! let key = CacheKey::catalog(CatalogKind::Course, "intro-to-rust");
//!
//! let _sub = store.subscribe(&key, |data| println!("course changed: {:?}", data.kind()));
//! store.set(key.clone(), CachedData::Course(course));
//!
//! if store.is_stale(&key, Some(Duration::from_secs(60))) {
//!     // refetch
//! }
//! ```

pub mod freshness;
pub mod key;
pub mod store;
pub mod subject;
pub mod traits;
pub mod value;

pub use freshness::{is_stale_at, CacheRead};
pub use key::{CacheKey, KeyParseError};
pub use store::{CacheStore, CacheStoreBuilder, Subscription};
pub use subject::{Observer, ObserverId, ObserverIds, Subject};
pub use traits::{CacheStats, CachedEntity, CatalogEntity, UserEntity, ALL_ID};
pub use value::CachedData;
