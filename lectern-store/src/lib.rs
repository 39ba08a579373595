//! Lectern Store - Course Cache and Fetch Layer
//!
//! Timestamped in-memory cache for course platform data, split into a shared
//! catalog partition and a per-user partition:
//! - `cache`: keys, payloads, the store itself and per-key subscribers
//! - `repository`: typed accessors and the progress/notes/purchase merges
//! - `dedup`: one in-flight fetch per key, with stale-data fallback
//! - `persistence`: catalog snapshots to memory, files or LMDB
//! - `queries`: the entry point joining the above with the remote services

pub mod cache;
pub mod clock;
pub mod config;
pub mod dedup;
pub mod persistence;
pub mod queries;
pub mod repository;
pub mod service;
pub mod telemetry;

pub use cache::{
    is_stale_at, CacheKey, CacheRead, CacheStats, CacheStore, CacheStoreBuilder, CachedData,
    CachedEntity, CatalogEntity, KeyParseError, Observer, ObserverId, ObserverIds, Subject,
    Subscription, UserEntity, ALL_ID,
};
pub use clock::{elapsed_between, Clock, ManualClock, SystemClock};
pub use config::StoreConfig;
pub use dedup::{DedupStats, QueryDeduplicator};
pub use persistence::{
    FileStorage, LmdbStorage, LmdbStorageError, MemoryStorage, PersistedState,
    PersistencePartition, StorageAdapter, STATE_VERSION,
};
pub use queries::CourseQueries;
pub use repository::{CatalogRepository, Repositories, UserRepository};
pub use service::{AuthIdentity, DocumentService, EntityRequest};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
