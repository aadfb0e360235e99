//! Remote key-value store primitives.
//!
//! The remote-store lock driver builds a binary semaphore out of nothing but
//! set membership, list push, blocking list pop, and atomic batches. This
//! module is the seam between that protocol and an actual store:
//!
//! - [`KeyValueStore`]: the primitive operations a store has to offer
//! - [`Batch`]: an ordered list of [`Command`]s executed as one unit
//! - [`MemoryStore`]: in-process store with real blocking-pop semantics
//! - `RedisStore`: Redis adapter (cargo feature `redis`)

mod batch;
mod memory;
#[cfg(feature = "redis")]
mod redis;


use std::time::Duration;
use thiserror::Error;

pub use batch::{Batch, Command, Reply};
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

/// Failure talking to the store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The connection failed or the store could not be reached.
    #[error("store transport failed: {0}")]
    Transport(String),

    /// The store rejected a command (wrong type, aborted transaction, ...).
    #[error("store command failed: {0}")]
    Command(String),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Primitive operations consumed by the remote-store lock driver.
///
/// Each single operation is atomic on its own. [`KeyValueStore::exec`] runs a
/// whole [`Batch`] without interleaving with other batches on the same keys.
pub trait KeyValueStore: Send {
    /// Add `member` to the set at `key`. Returns `true` if it was not there.
    fn sadd(&mut self, key: &str, member: &str) -> StoreResult<bool>;

    /// Whether `member` is in the set at `key`.
    fn sismember(&mut self, key: &str, member: &str) -> StoreResult<bool>;

    /// Remove `member` from the set at `key`. Returns `true` if it was there.
    fn srem(&mut self, key: &str, member: &str) -> StoreResult<bool>;

    /// Append `value` to the list at `key`, returning the new length.
    fn rpush(&mut self, key: &str, value: &str) -> StoreResult<u64>;

    /// Pop the head of the list at `key`, waiting up to `timeout` for one.
    ///
    /// A zero timeout never waits. `Ok(None)` means the wait ran out.
    fn blpop(&mut self, key: &str, timeout: Duration) -> StoreResult<Option<String>>;

    /// Run every command of `batch` in order as one indivisible unit.
    ///
    /// Returns one [`Reply`] per command. A sub-command that fails inside an
    /// otherwise completed batch shows up as [`Reply::Error`].
    fn exec(&mut self, batch: &Batch) -> StoreResult<Vec<Reply>>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn sadd(&mut self, key: &str, member: &str) -> StoreResult<bool> {
        (**self).sadd(key, member)
    }

    fn sismember(&mut self, key: &str, member: &str) -> StoreResult<bool> {
        (**self).sismember(key, member)
    }

    fn srem(&mut self, key: &str, member: &str) -> StoreResult<bool> {
        (**self).srem(key, member)
    }

    fn rpush(&mut self, key: &str, value: &str) -> StoreResult<u64> {
        (**self).rpush(key, value)
    }

    fn blpop(&mut self, key: &str, timeout: Duration) -> StoreResult<Option<String>> {
        (**self).blpop(key, timeout)
    }

    fn exec(&mut self, batch: &Batch) -> StoreResult<Vec<Reply>> {
        (**self).exec(batch)
    }
}
