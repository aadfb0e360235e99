//! Database named-lock drivers.
//!
//! Both engines already have named locks, so these drivers only derive a lock
//! name from the label and run one query. The connection is abstracted by
//! [`SqlLockSession`]; a `postgres::Client` implementation is available with
//! the `postgres` cargo feature.

use super::LockDriver;
use super::keys::{crc32, sha256_hex};
use crate::error::Result;
use tracing::debug;

/// `GET_LOCK` timeout meaning "do not wait".
pub const NO_WAIT: u32 = 0;

/// Bind parameter for a lock query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlArg<'a> {
    Text(&'a str),
    Int(i64),
}

/// A database session able to run a single-value lock query.
pub trait SqlLockSession: Send {
    /// Run `query` and interpret the first column of the first row as a flag.
    ///
    /// A missing row or a NULL value reads as `false`.
    fn query_flag(&mut self, query: &str, args: &[SqlArg<'_>]) -> Result<bool>;
}

impl<S: SqlLockSession + ?Sized> SqlLockSession for Box<S> {
    fn query_flag(&mut self, query: &str, args: &[SqlArg<'_>]) -> Result<bool> {
        (**self).query_flag(query, args)
    }
}

/// PostgreSQL session-level advisory locks, keyed by CRC-32 of the label.
#[derive(Debug)]
pub struct PostgresDriver<S> {
    session: S,
}

impl<S: SqlLockSession> PostgresDriver<S> {
    pub fn new(session: S) -> Self {
        Self { session }
    }

    fn lock_id(label: &str) -> i64 {
        i64::from(crc32(label))
    }
}

impl<S: SqlLockSession> LockDriver for PostgresDriver<S> {
    fn acquire_lock(&mut self, label: &str) -> Result<bool> {
        let lock_id = Self::lock_id(label);
        let locked = self
            .session
            .query_flag("SELECT pg_try_advisory_lock($1)", &[SqlArg::Int(lock_id)])?;
        debug!(label, lock_id, locked, "pg_try_advisory_lock");
        Ok(locked)
    }

    fn release_lock(&mut self, label: &str) -> Result<bool> {
        let lock_id = Self::lock_id(label);
        let unlocked = self
            .session
            .query_flag("SELECT pg_advisory_unlock($1)", &[SqlArg::Int(lock_id)])?;
        debug!(label, lock_id, unlocked, "pg_advisory_unlock");
        Ok(unlocked)
    }
}

/// MySQL/MariaDB `GET_LOCK` named locks, keyed by SHA-256 of the label.
#[derive(Debug)]
pub struct MySqlDriver<S> {
    session: S,
    lock_timeout: u32,
}

impl<S: SqlLockSession> MySqlDriver<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            lock_timeout: NO_WAIT,
        }
    }

    /// Seconds `GET_LOCK` may wait. [`NO_WAIT`] fails immediately.
    pub fn with_lock_timeout(mut self, seconds: u32) -> Self {
        self.lock_timeout = seconds;
        self
    }
}

impl<S: SqlLockSession> LockDriver for MySqlDriver<S> {
    fn acquire_lock(&mut self, label: &str) -> Result<bool> {
        let lock_name = sha256_hex(label);
        let locked = self.session.query_flag(
            "SELECT GET_LOCK(?, ?)",
            &[
                SqlArg::Text(&lock_name),
                SqlArg::Int(i64::from(self.lock_timeout)),
            ],
        )?;
        debug!(label, lock_name, locked, "GET_LOCK");
        Ok(locked)
    }

    fn release_lock(&mut self, label: &str) -> Result<bool> {
        let lock_name = sha256_hex(label);
        let unlocked = self
            .session
            .query_flag("SELECT RELEASE_LOCK(?)", &[SqlArg::Text(&lock_name)])?;
        debug!(label, lock_name, unlocked, "RELEASE_LOCK");
        Ok(unlocked)
    }
}

#[cfg(feature = "postgres")]
mod pg {
    use super::{SqlArg, SqlLockSession};
    use crate::error::{CriticalSectionError, Result};
    use postgres::types::ToSql;

    impl SqlLockSession for postgres::Client {
        fn query_flag(&mut self, query: &str, args: &[SqlArg<'_>]) -> Result<bool> {
            let owned: Vec<Box<dyn ToSql + Sync>> = args
                .iter()
                .map(|arg| match *arg {
                    SqlArg::Text(text) => Box::new(text.to_string()) as Box<dyn ToSql + Sync>,
                    SqlArg::Int(n) => Box::new(n),
                })
                .collect();
            let params: Vec<&(dyn ToSql + Sync)> = owned.iter().map(|p| p.as_ref()).collect();

            let row = self
                .query_opt(query, &params)
                .map_err(|e| CriticalSectionError::Sql(e.to_string()))?;
            let flag = match row {
                Some(row) => row
                    .try_get::<_, Option<bool>>(0)
                    .map_err(|e| CriticalSectionError::Sql(e.to_string()))?,
                None => None,
            };
            Ok(flag.unwrap_or(false))
        }
    }
}
