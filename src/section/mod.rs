//! Critical section manager.
//!
//! [`CriticalSection`] is what application code talks to. It wraps one
//! [`LockDriver`] and remembers which labels this instance currently holds,
//! so repeated `enter`/`leave` calls are answered locally with `false`
//! instead of reaching the backend.
//!
//! # Teardown
//!
//! Call [`CriticalSection::close`] when done. It tries to release every label
//! still held, keeps going past failures, and reports them: one failure is
//! returned as is, several are folded into
//! [`CriticalSectionError::Teardown`]. If the manager is dropped without
//! `close`, the same release pass runs and failures are logged as warnings.


use crate::driver::LockDriver;
use crate::error::{CriticalSectionError, Result};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Named critical sections backed by a [`LockDriver`].
///
/// Not thread-safe by itself: threads sharing one manager must serialize
/// access to it.
#[derive(Debug)]
pub struct CriticalSection<D: LockDriver = Box<dyn LockDriver>> {
    driver: D,
    held: BTreeSet<String>,
    closed: bool,
}

impl<D: LockDriver> CriticalSection<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            held: BTreeSet::new(),
            closed: false,
        }
    }

    /// Enter the critical section `label`.
    ///
    /// Returns `false` without asking the driver when this instance already
    /// holds `label`, and `false` when the driver could not take the lock.
    pub fn enter(&mut self, label: &str) -> Result<bool> {
        if self.is_entered(label) {
            return Ok(false);
        }

        let acquired = self.driver.acquire_lock(label)?;
        if acquired {
            self.held.insert(label.to_string());
        }
        Ok(acquired)
    }

    /// Leave the critical section `label`.
    ///
    /// Returns `false` without asking the driver when `label` is not held.
    /// When the driver refuses, `label` stays marked as held.
    pub fn leave(&mut self, label: &str) -> Result<bool> {
        if !self.is_entered(label) {
            return Ok(false);
        }

        let released = self.driver.release_lock(label)?;
        if released {
            self.held.remove(label);
        }
        Ok(released)
    }

    /// Whether this instance currently holds `label`.
    pub fn is_entered(&self, label: &str) -> bool {
        self.held.contains(label)
    }

    /// Labels currently held, in sorted order.
    pub fn entered(&self) -> impl Iterator<Item = &str> {
        self.held.iter().map(String::as_str)
    }

    /// Run `f` inside the critical section `label`.
    ///
    /// Returns `Ok(None)` if the section could not be entered. If leaving
    /// fails afterwards the label stays held and is retried on teardown.
    pub fn run<T>(&mut self, label: &str, f: impl FnOnce() -> T) -> Result<Option<T>> {
        if !self.enter(label)? {
            return Ok(None);
        }

        let output = f();
        if !self.leave(label)? {
            warn!(label, "driver refused to leave critical section");
        }
        Ok(Some(output))
    }

    /// The driver this manager delegates to, for inspecting backend state.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Mutable access to the driver.
    ///
    /// Locks taken or released through it bypass the manager's bookkeeping.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Release everything still held and report what failed.
    pub fn close(mut self) -> Result<()> {
        let errors = self.release_all();
        self.closed = true;
        match CriticalSectionError::from_teardown(errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn release_all(&mut self) -> Vec<CriticalSectionError> {
        let labels: Vec<String> = self.held.iter().cloned().collect();
        let mut errors = Vec::new();

        for label in labels {
            match self.leave(&label) {
                Ok(true) => debug!(label, "released critical section on teardown"),
                Ok(false) => errors.push(CriticalSectionError::ReleaseRejected { label }),
                Err(e) => errors.push(e),
            }
        }
        errors
    }
}

impl<D: LockDriver> Drop for CriticalSection<D> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        for err in self.release_all() {
            warn!(error = %err, "failed to release critical section on drop");
        }
    }
}
