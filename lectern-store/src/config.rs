//! Store configuration.

use std::time::Duration;

use lectern_core::{ConfigError, LecternResult};

use crate::persistence::STATE_VERSION;

/// Default staleness window for freshness checks (5 minutes).
pub const DEFAULT_MAX_AGE_SECS: u64 = 300;

/// Default retention window before an unobserved entry is evicted (10 minutes).
pub const DEFAULT_RETENTION_SECS: u64 = 600;

/// Default delay that coalesces catalog writes into one persisted snapshot.
pub const DEFAULT_PERSIST_DEBOUNCE_MS: u64 = 250;

/// Default key the persisted catalog state is stored under.
pub const DEFAULT_STORAGE_KEY: &str = "lectern-state";

/// Configuration for a [`CacheStore`](crate::CacheStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Staleness window used when a caller passes no `max_age`.
    pub default_max_age: Duration,
    /// How long an entry without subscribers survives its last write.
    pub retention: Duration,
    /// Persist the catalog partition after catalog writes.
    pub persist_on_write: bool,
    /// Writes landing within this window share one background snapshot.
    pub persist_debounce: Duration,
    /// Key under which durable adapters store the persisted state.
    pub storage_key: String,
    /// Version stamped into persisted state; other versions are discarded on load.
    pub state_version: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_max_age: Duration::from_secs(DEFAULT_MAX_AGE_SECS),
            retention: Duration::from_secs(DEFAULT_RETENTION_SECS),
            persist_on_write: true,
            persist_debounce: Duration::from_millis(DEFAULT_PERSIST_DEBOUNCE_MS),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            state_version: STATE_VERSION,
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Unset or unparseable variables keep their defaults:
    /// - `LECTERN_CACHE_MAX_AGE_SECS`
    /// - `LECTERN_CACHE_RETENTION_SECS`
    /// - `LECTERN_PERSIST_ON_WRITE` (anything but `false` enables it)
    /// - `LECTERN_PERSIST_DEBOUNCE_MS`
    /// - `LECTERN_STORAGE_KEY`
    pub fn from_env() -> Self {
        let default_max_age = Duration::from_secs(
            std::env::var("LECTERN_CACHE_MAX_AGE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_AGE_SECS),
        );

        let retention = Duration::from_secs(
            std::env::var("LECTERN_CACHE_RETENTION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RETENTION_SECS),
        );

        let persist_on_write = std::env::var("LECTERN_PERSIST_ON_WRITE")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(true);

        let persist_debounce = Duration::from_millis(
            std::env::var("LECTERN_PERSIST_DEBOUNCE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_PERSIST_DEBOUNCE_MS),
        );

        let storage_key = std::env::var("LECTERN_STORAGE_KEY")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_STORAGE_KEY.to_string());

        Self {
            default_max_age,
            retention,
            persist_on_write,
            persist_debounce,
            storage_key,
            state_version: STATE_VERSION,
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.default_max_age = max_age;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_persist_on_write(mut self, enabled: bool) -> Self {
        self.persist_on_write = enabled;
        self
    }

    pub fn with_persist_debounce(mut self, debounce: Duration) -> Self {
        self.persist_debounce = debounce;
        self
    }

    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    pub fn with_state_version(mut self, version: u32) -> Self {
        self.state_version = version;
        self
    }

    /// Reject configurations the store cannot run with.
    ///
    /// Called by [`CacheStoreBuilder::build`](crate::CacheStoreBuilder::build).
    pub fn validate(&self) -> LecternResult<()> {
        if self.default_max_age.is_zero() {
            return Err(invalid("default_max_age", "0s", "staleness window must be positive").into());
        }
        if self.retention.is_zero() {
            return Err(invalid("retention", "0s", "retention window must be positive").into());
        }
        if self.storage_key.trim().is_empty() {
            return Err(invalid("storage_key", &self.storage_key, "storage key must not be empty").into());
        }
        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_core::LecternError;

    #[test]
    fn test_config_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.default_max_age, Duration::from_secs(300));
        assert_eq!(config.retention, Duration::from_secs(600));
        assert!(config.persist_on_write);
        assert_eq!(config.persist_debounce, Duration::from_millis(250));
        assert_eq!(config.storage_key, "lectern-state");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builders() {
        let config = StoreConfig::new()
            .with_max_age(Duration::from_secs(30))
            .with_retention(Duration::from_secs(60))
            .with_persist_on_write(false)
            .with_persist_debounce(Duration::ZERO)
            .with_storage_key("custom");
        assert_eq!(config.default_max_age, Duration::from_secs(30));
        assert_eq!(config.retention, Duration::from_secs(60));
        assert!(!config.persist_on_write);
        assert_eq!(config.storage_key, "custom");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_durations() {
        let err = StoreConfig::new()
            .with_retention(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            LecternError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "retention"
        ));
        assert!(StoreConfig::new().with_max_age(Duration::ZERO).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_storage_key() {
        assert!(StoreConfig::new().with_storage_key("  ").validate().is_err());
    }
}
