//! Lock drivers.
//!
//! A driver does the actual mutual exclusion behind a
//! [`CriticalSection`](crate::CriticalSection). Every backend implements the
//! same two-operation [`LockDriver`] contract:
//!
//! - [`RemoteStoreDriver`]: binary semaphore built from key-value primitives
//! - [`FileDriver`]: exclusive advisory lock on a per-label file
//! - [`SemaphoreDriver`]: System-V semaphore, single host only (Linux)
//! - [`PostgresDriver`] / [`MySqlDriver`]: database named/advisory locks
//!
//! # Contract
//!
//! `acquire_lock` and `release_lock` return `Ok(true)` when the lock changed
//! hands and `Ok(false)` for every expected refusal (held elsewhere, wait
//! timed out, nothing to release). `Err` is reserved for backend failures.

mod file;
pub mod keys;
mod metadata;
mod remote;
#[cfg(target_os = "linux")]
mod semaphore;
mod sql;

#[cfg(test)]
mod tests;

use crate::error::Result;

pub use file::FileDriver;
pub use metadata::HolderMetadata;
pub use remote::{DEFAULT_ACQUIRE_TIMEOUT, RemoteStoreDriver};
#[cfg(target_os = "linux")]
pub use semaphore::SemaphoreDriver;
pub use sql::{MySqlDriver, NO_WAIT, PostgresDriver, SqlArg, SqlLockSession};

/// Capability contract shared by every lock backend.
pub trait LockDriver: Send {
    /// Try to take the lock for `label`.
    fn acquire_lock(&mut self, label: &str) -> Result<bool>;

    /// Give back the lock for `label`.
    fn release_lock(&mut self, label: &str) -> Result<bool>;
}

impl<D: LockDriver + ?Sized> LockDriver for Box<D> {
    fn acquire_lock(&mut self, label: &str) -> Result<bool> {
        (**self).acquire_lock(label)
    }

    fn release_lock(&mut self, label: &str) -> Result<bool> {
        (**self).release_lock(label)
    }
}
