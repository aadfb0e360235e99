//! Lock driver built from remote key-value store primitives.
//!
//! The store has no lock primitive, so each label gets a one-slot token list:
//! a token in the list means the lock is free, an empty list means it is held.
//! Acquiring is a blocking pop with a bounded wait, releasing pushes the token
//! back. Two sets sit next to the list:
//!
//! - `<lock>:initialized` records that the token list has been seeded. Only
//!   the caller whose `SADD` actually inserts the member seeds it.
//! - `<lock>:released` records that the outstanding hold has already been
//!   given back, so a second release cannot push a second token.
//!
//! Everything that touches more than one of these keys runs inside a single
//! atomic batch.

use super::LockDriver;
use crate::error::{CriticalSectionError, Result};
use crate::store::{Batch, KeyValueStore, Reply, StoreError};
use std::time::Duration;
use tracing::{debug, warn};

/// Default wait for a token before giving up on an acquire.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(1);

const LOCK_VALUE: &str = "1";
const RELEASED_MEMBER: &str = "1";

/// Binary semaphore per label over a [`KeyValueStore`].
///
/// The lock record is created lazily by the first acquire of a label and is
/// never expired by this driver. A holder that dies without releasing keeps
/// the label held until an operator deletes its keys.
#[derive(Debug)]
pub struct RemoteStoreDriver<S> {
    store: S,
    acquire_timeout: Duration,
    namespace: String,
}

impl<S: KeyValueStore> RemoteStoreDriver<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            namespace: String::new(),
        }
    }

    /// How long an acquire waits for the token. Zero never waits.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Prefix prepended to every key this driver touches.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Key of the token list for `label`.
    pub fn lock_key(&self, label: &str) -> String {
        format!("{}{}:lock", self.namespace, label)
    }

    fn initialized_key(lock_key: &str) -> String {
        format!("{}:initialized", lock_key)
    }

    fn released_key(lock_key: &str) -> String {
        format!("{}:released", lock_key)
    }

    /// Seed the token list. Runs once per label, by the initialization winner.
    fn initialize(&mut self, label: &str, lock_key: &str) -> Result<()> {
        let released_key = Self::released_key(lock_key);
        let batch = Batch::new()
            .del(lock_key)
            .del(&released_key)
            .rpush(lock_key, LOCK_VALUE)
            .sadd(&released_key, RELEASED_MEMBER);

        let fail = |reason: String| {
            warn!(label, lock_key, %reason, "critical section initialization failed");
            CriticalSectionError::Initialization {
                label: label.to_string(),
                reason,
            }
        };

        let replies = self.store.exec(&batch).map_err(|e| fail(e.to_string()))?;
        if replies.len() != batch.len() {
            return Err(fail(format!(
                "expected {} replies, got {}",
                batch.len(),
                replies.len()
            )));
        }
        if let Some(Reply::Error(message)) = replies.iter().find(|reply| reply.is_error()) {
            return Err(fail(message.clone()));
        }

        debug!(label, lock_key, "initialized critical section token");
        Ok(())
    }
}

impl<S: KeyValueStore> LockDriver for RemoteStoreDriver<S> {
    fn acquire_lock(&mut self, label: &str) -> Result<bool> {
        let lock_key = self.lock_key(label);
        let acquire_error = |source: StoreError| CriticalSectionError::Acquire {
            label: label.to_string(),
            source,
        };

        // Relies on a single store instance for atomicity of SADD.
        let first_use = self
            .store
            .sadd(&Self::initialized_key(&lock_key), &lock_key)
            .map_err(acquire_error)?;
        if first_use {
            self.initialize(label, &lock_key)?;
        }

        let batch = Batch::new()
            .blpop(&lock_key, self.acquire_timeout)
            .srem(Self::released_key(&lock_key), RELEASED_MEMBER);
        let replies = self.store.exec(&batch).map_err(acquire_error)?;

        // A surviving released marker would make this hold unreleasable.
        if let Some(Reply::Error(message)) = replies.get(1) {
            warn!(label, lock_key, %message, "clearing released marker failed");
            return Err(acquire_error(StoreError::Command(message.clone())));
        }

        match replies.first() {
            Some(Reply::Popped(Some(_))) => {
                debug!(label, lock_key, "acquired critical section lock");
                Ok(true)
            }
            Some(Reply::Popped(None)) => {
                debug!(
                    label,
                    lock_key,
                    timeout_ms = self.acquire_timeout.as_millis() as u64,
                    "critical section lock not acquired within timeout"
                );
                Ok(false)
            }
            Some(Reply::Error(message)) => Err(acquire_error(StoreError::Command(message.clone()))),
            other => Err(acquire_error(StoreError::Command(format!(
                "unexpected reply to blocking pop: {:?}",
                other
            )))),
        }
    }

    fn release_lock(&mut self, label: &str) -> Result<bool> {
        let lock_key = self.lock_key(label);
        let released_key = Self::released_key(&lock_key);

        if !self
            .store
            .sismember(&Self::initialized_key(&lock_key), &lock_key)?
        {
            debug!(label, lock_key, "release of never-initialized critical section");
            return Ok(false);
        }
        if self.store.sismember(&released_key, RELEASED_MEMBER)? {
            debug!(label, lock_key, "critical section already released");
            return Ok(false);
        }

        let batch = Batch::new()
            .rpush(&lock_key, LOCK_VALUE)
            .sadd(&released_key, RELEASED_MEMBER);
        let replies = self.store.exec(&batch)?;

        match replies.first() {
            Some(Reply::Integer(_)) => {
                debug!(label, lock_key, "released critical section lock");
                Ok(true)
            }
            other => {
                warn!(label, lock_key, reply = ?other, "token push failed on release");
                Ok(false)
            }
        }
    }
}
