use crate::driver::LockDriver;
use crate::error::{CriticalSectionError, Result};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Driver call as seen by [`RecordingDriver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Acquire(String),
    Release(String),
}

/// In-memory driver that records calls and refuses or fails on request.
///
/// Clones share the call log, so a test can keep one clone after handing the
/// other to a manager.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingDriver {
    calls: Arc<Mutex<Vec<Call>>>,
    refuse_acquire: HashSet<String>,
    refuse_release: HashSet<String>,
    fail_release: HashSet<String>,
}

impl RecordingDriver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// `acquire_lock(label)` answers `Ok(false)`.
    pub(crate) fn refusing_acquire(mut self, label: &str) -> Self {
        self.refuse_acquire.insert(label.to_string());
        self
    }

    /// `release_lock(label)` answers `Ok(false)`.
    pub(crate) fn refusing_release(mut self, label: &str) -> Self {
        self.refuse_release.insert(label.to_string());
        self
    }

    /// `release_lock(label)` answers with a backend error.
    pub(crate) fn failing_release(mut self, label: &str) -> Self {
        self.fail_release.insert(label.to_string());
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }

    fn record(&self, call: Call) {
        self.calls
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .push(call);
    }
}

impl LockDriver for RecordingDriver {
    fn acquire_lock(&mut self, label: &str) -> Result<bool> {
        self.record(Call::Acquire(label.to_string()));
        Ok(!self.refuse_acquire.contains(label))
    }

    fn release_lock(&mut self, label: &str) -> Result<bool> {
        self.record(Call::Release(label.to_string()));
        if self.fail_release.contains(label) {
            return Err(CriticalSectionError::Sql(format!(
                "connection lost while releasing {}",
                label
            )));
        }
        Ok(!self.refuse_release.contains(label))
    }
}
