//! Config loading, validation, and driver construction.

use super::model::Config;
use super::types::Backend;
use crate::driver::{FileDriver, LockDriver};
use crate::error::{CriticalSectionError, Result};
use std::path::Path;
use std::time::Duration;

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(CriticalSectionError::Config)` - Read/parse error or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            CriticalSectionError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml).map_err(|e| {
            CriticalSectionError::Config(format!("failed to parse config YAML: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            CriticalSectionError::Config(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `redis_url` must be non-empty for the redis backend
    /// - `database_url` must be set for the postgres backend
    /// - `key_namespace` must not contain whitespace
    pub fn validate(&self) -> Result<()> {
        if self.backend == Backend::Redis && self.redis_url.trim().is_empty() {
            return Err(CriticalSectionError::Config(
                "config validation failed: redis_url must be set for the redis backend"
                    .to_string(),
            ));
        }

        if self.backend == Backend::Postgres
            && self
                .database_url
                .as_deref()
                .is_none_or(|url| url.trim().is_empty())
        {
            return Err(CriticalSectionError::Config(
                "config validation failed: database_url must be set for the postgres backend"
                    .to_string(),
            ));
        }

        if self.key_namespace.chars().any(char::is_whitespace) {
            return Err(CriticalSectionError::Config(format!(
                "config validation failed: key_namespace must not contain whitespace (found '{}')",
                self.key_namespace
            )));
        }

        Ok(())
    }

    /// Acquire timeout as a duration.
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Build the lock driver selected by `backend`.
    pub fn open_driver(&self) -> Result<Box<dyn LockDriver>> {
        match self.backend {
            Backend::File => Ok(Box::new(FileDriver::new(&self.lock_dir)?)),
            Backend::Redis => self.open_redis(),
            Backend::Postgres => self.open_postgres(),
            Backend::Semaphore => Self::open_semaphore(),
        }
    }

    #[cfg(feature = "redis")]
    fn open_redis(&self) -> Result<Box<dyn LockDriver>> {
        use crate::driver::RemoteStoreDriver;
        use crate::store::RedisStore;

        let store = RedisStore::open(&self.redis_url)?;
        Ok(Box::new(
            RemoteStoreDriver::new(store)
                .with_acquire_timeout(self.acquire_timeout())
                .with_namespace(self.key_namespace.clone()),
        ))
    }

    #[cfg(not(feature = "redis"))]
    fn open_redis(&self) -> Result<Box<dyn LockDriver>> {
        Err(CriticalSectionError::Config(
            "critsec was built without the `redis` feature".to_string(),
        ))
    }

    #[cfg(feature = "postgres")]
    fn open_postgres(&self) -> Result<Box<dyn LockDriver>> {
        use crate::driver::PostgresDriver;

        let url = self.database_url.as_deref().unwrap_or_default();
        let client = postgres::Client::connect(url, postgres::NoTls)
            .map_err(|e| CriticalSectionError::Sql(e.to_string()))?;
        Ok(Box::new(PostgresDriver::new(client)))
    }

    #[cfg(not(feature = "postgres"))]
    fn open_postgres(&self) -> Result<Box<dyn LockDriver>> {
        Err(CriticalSectionError::Config(
            "critsec was built without the `postgres` feature".to_string(),
        ))
    }

    #[cfg(target_os = "linux")]
    fn open_semaphore() -> Result<Box<dyn LockDriver>> {
        Ok(Box::new(crate::driver::SemaphoreDriver::new()))
    }

    #[cfg(not(target_os = "linux"))]
    fn open_semaphore() -> Result<Box<dyn LockDriver>> {
        Err(CriticalSectionError::Config(
            "the semaphore backend is only available on Linux".to_string(),
        ))
    }
}
