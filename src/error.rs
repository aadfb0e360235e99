//! Error types for critsec.
//!
//! Expected outcomes (section busy, wait timed out, nothing to release) are
//! plain `false` results and never show up here. Everything in this module is
//! a failure the caller has to look at.

use crate::exit_codes;
use crate::store::StoreError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for critsec operations.
#[derive(Error, Debug)]
pub enum CriticalSectionError {
    /// Configuration is invalid or a CLI argument makes no sense.
    #[error("{0}")]
    Config(String),

    /// The first-enter batch that seeds a label's lock state did not complete.
    ///
    /// The shared lock record is inconsistent after this and nobody can make
    /// safe progress on the label.
    #[error("cannot initialize critical section on first enter for \"{label}\": {reason}")]
    Initialization { label: String, reason: String },

    /// The acquire batch failed in transport or in the store.
    #[error("could not acquire critical section lock for \"{label}\": {source}")]
    Acquire {
        label: String,
        #[source]
        source: StoreError,
    },

    /// Any other remote store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The file backend's lock directory could not be created.
    #[error("unable to create lock directory '{}': {source}", .path.display())]
    LockDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Filesystem failure outside directory creation.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// A SQL advisory lock query failed.
    #[error("SQL lock query failed: {0}")]
    Sql(String),

    /// A System-V semaphore call failed.
    #[error("semaphore operation failed: {0}")]
    Semaphore(String),

    /// The driver refused to release a section while closing.
    #[error("driver refused to release critical section \"{label}\"")]
    ReleaseRejected { label: String },

    /// More than one section failed to release while closing.
    #[error(
        "too many errors while closing critical section. Messages:\n{}",
        format_messages(.messages)
    )]
    Teardown { messages: Vec<String> },
}

fn format_messages(messages: &[String]) -> String {
    messages
        .iter()
        .enumerate()
        .map(|(index, message)| format!("{}: {}\n", index, message))
        .collect()
}

impl CriticalSectionError {
    /// Build an I/O error with a short description of what was being done.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        CriticalSectionError::Io {
            context: context.into(),
            source,
        }
    }

    /// Collapse the failures gathered while closing into one error.
    ///
    /// Returns `None` for an empty list and the failure itself when there is
    /// only one.
    pub fn from_teardown(mut errors: Vec<CriticalSectionError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(CriticalSectionError::Teardown {
                messages: errors.iter().map(|e| e.to_string()).collect(),
            }),
        }
    }

    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            CriticalSectionError::Config(_) => exit_codes::USER_ERROR,
            CriticalSectionError::ReleaseRejected { .. }
            | CriticalSectionError::Teardown { .. } => exit_codes::TEARDOWN_FAILURE,
            CriticalSectionError::Initialization { .. }
            | CriticalSectionError::Acquire { .. }
            | CriticalSectionError::Store(_)
            | CriticalSectionError::LockDirectory { .. }
            | CriticalSectionError::Io { .. }
            | CriticalSectionError::Sql(_)
            | CriticalSectionError::Semaphore(_) => exit_codes::BACKEND_FAILURE,
        }
    }
}

/// Result type alias for critsec operations.
pub type Result<T> = std::result::Result<T, CriticalSectionError>;
