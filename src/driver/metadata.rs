//! Holder metadata written into file-backed locks.

use crate::error::{CriticalSectionError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Who holds a file-backed critical section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HolderMetadata {
    /// The label the lock protects.
    pub label: String,

    /// Owner of the lock (e.g., `user@HOST`).
    pub owner: String,

    /// Process ID of the lock holder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    /// Timestamp when the lock was taken (RFC3339).
    pub created_at: DateTime<Utc>,
}

impl HolderMetadata {
    /// Metadata for the current process taking `label` now.
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            owner: get_owner_string(),
            pid: Some(std::process::id()),
            created_at: Utc::now(),
        }
    }

    /// Parse holder metadata from a lock file.
    ///
    /// Returns `Ok(None)` for an empty file (the lock was released or never
    /// taken by a process that writes metadata).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            CriticalSectionError::io(format!("failed to read lock file '{}'", path.display()), e)
        })?;
        if content.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&content).map(Some).map_err(|e| {
            CriticalSectionError::Config(format!(
                "failed to parse lock file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Serialize holder metadata to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            CriticalSectionError::Config(format!("failed to serialize lock metadata: {}", e))
        })
    }

    /// How long the lock has been held.
    pub fn age(&self) -> Duration {
        Utc::now().signed_duration_since(self.created_at)
    }

    /// Format the age as a human-readable string.
    pub fn age_string(&self) -> String {
        let age = self.age();
        let minutes = age.num_minutes();
        let hours = age.num_hours();
        let days = age.num_days();

        if days > 0 {
            format!("{}d {}h", days, hours % 24)
        } else if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else {
            format!("{}m", minutes)
        }
    }
}

impl std::fmt::Display for HolderMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (owner: {}", self.label, self.owner)?;
        if let Some(pid) = self.pid {
            write!(f, ", pid: {}", pid)?;
        }
        write!(f, ", held for: {})", self.age_string())
    }
}

fn get_owner_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}
