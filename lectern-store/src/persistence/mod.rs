//! Persistence partition and durable storage adapters.
//!
//! Only the catalog partition (courses, catalog listings, lessons, instructor
//! profiles and course statistics) is written to durable storage. User-scoped
//! entries never leave memory.

pub mod adapter;
pub mod lmdb;
pub mod partition;

pub use adapter::{FileStorage, MemoryStorage, StorageAdapter};
pub use lmdb::{LmdbStorage, LmdbStorageError};
pub use partition::{PersistedState, PersistencePartition, STATE_VERSION};
