//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for critsec.
///
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which lock backend to use.
    #[serde(default)]
    pub backend: Backend,

    // =========================================================================
    // File backend
    // =========================================================================
    /// Directory holding lock files (created on first use).
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,

    // =========================================================================
    // Redis backend
    // =========================================================================
    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// How long an acquire waits for the token, in milliseconds (0 = no wait).
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Prefix prepended to every Redis key.
    #[serde(default)]
    pub key_namespace: String,

    // =========================================================================
    // Postgres backend
    // =========================================================================
    /// Database connection string for the postgres backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            lock_dir: default_lock_dir(),
            redis_url: default_redis_url(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            key_namespace: String::new(),
            database_url: None,
        }
    }
}
