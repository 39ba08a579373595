//! LMDB-backed durable storage.
//!
//! Uses the heed crate (Rust bindings for LMDB). Each storage key maps to one
//! value in a single unnamed database; writes are committed in their own
//! transaction.

use std::fmt;
use std::path::{Path, PathBuf};

use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use lectern_core::PersistenceError;

use super::adapter::StorageAdapter;

/// Error type for LMDB storage operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStorageError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStorageError> for PersistenceError {
    fn from(e: LmdbStorageError) -> Self {
        match e {
            LmdbStorageError::Io(io) => io.into(),
            other => PersistenceError::Unavailable {
                reason: other.to_string(),
            },
        }
    }
}

/// LMDB environment holding persisted state.
pub struct LmdbStorage {
    env: Env,
    db: Database<Str, Bytes>,
    path: PathBuf,
}

impl LmdbStorage {
    /// Open (or create) an LMDB environment in `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the environment
    /// or database cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStorageError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStorageError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbStorageError::Transaction(e.to_string()))?;

        let db: Database<Str, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStorageError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStorageError::Transaction(e.to_string()))?;

        Ok(Self {
            env,
            db,
            path: path.as_ref().to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for LmdbStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LmdbStorage").field("path", &self.path).finish()
    }
}

impl StorageAdapter for LmdbStorage {
    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), PersistenceError> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStorageError::Transaction(e.to_string()))?;

        self.db
            .put(&mut wtxn, key, bytes)
            .map_err(|e| LmdbStorageError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStorageError::Transaction(e.to_string()))?;
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbStorageError::Transaction(e.to_string()))?;

        let value = self
            .db
            .get(&rtxn, key)
            .map_err(|e| LmdbStorageError::Transaction(e.to_string()))?;
        Ok(value.map(<[u8]>::to_vec))
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStorageError::Transaction(e.to_string()))?;

        self.db
            .delete(&mut wtxn, key)
            .map_err(|e| LmdbStorageError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStorageError::Transaction(e.to_string()))?;
        Ok(())
    }
}
