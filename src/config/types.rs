//! Configuration types and defaults for critsec.
//!
//! This module defines enums and default value functions used by the Config
//! struct.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lock backend used by the critical section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Advisory locks on files in `lock_dir` (default, needs no server).
    #[default]
    File,
    /// One-slot token lists in Redis.
    Redis,
    /// PostgreSQL advisory locks.
    Postgres,
    /// System-V semaphores (single host, Linux only).
    Semaphore,
}

impl Backend {
    /// Parse a backend from a string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "file" => Some(Self::File),
            "redis" => Some(Self::Redis),
            "postgres" => Some(Self::Postgres),
            "semaphore" => Some(Self::Semaphore),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Redis => "redis",
            Self::Postgres => "postgres",
            Self::Semaphore => "semaphore",
        }
    }
}

pub fn default_lock_dir() -> PathBuf {
    std::env::temp_dir().join("critsec")
}

pub fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

pub fn default_acquire_timeout_ms() -> u64 {
    1000
}
