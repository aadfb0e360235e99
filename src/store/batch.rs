//! Atomic command batches.

use std::time::Duration;

/// One primitive operation inside a [`Batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Delete `key` whatever it holds.
    Del { key: String },
    /// Add `member` to the set at `key`.
    SAdd { key: String, member: String },
    /// Remove `member` from the set at `key`.
    SRem { key: String, member: String },
    /// Append `value` to the list at `key`.
    RPush { key: String, value: String },
    /// Pop the head of the list at `key`, waiting up to `timeout`.
    BLPop { key: String, timeout: Duration },
}

/// Result of a single [`Command`] in an executed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Integer reply: removed/added counts, list lengths.
    Integer(i64),
    /// Reply of a pop. `None` when the list stayed empty.
    Popped(Option<String>),
    /// The command failed while the rest of the batch went through.
    Error(String),
}

impl Reply {
    /// Whether this reply reports a failed sub-command.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

/// An ordered list of commands the store runs as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    commands: Vec<Command>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn del(mut self, key: impl Into<String>) -> Self {
        self.commands.push(Command::Del { key: key.into() });
        self
    }

    pub fn sadd(mut self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.commands.push(Command::SAdd {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    pub fn srem(mut self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.commands.push(Command::SRem {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    pub fn rpush(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.commands.push(Command::RPush {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn blpop(mut self, key: impl Into<String>, timeout: Duration) -> Self {
        self.commands.push(Command::BLPop {
            key: key.into(),
            timeout,
        });
        self
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl FromIterator<Command> for Batch {
    fn from_iter<I: IntoIterator<Item = Command>>(iter: I) -> Self {
        Self {
            commands: iter.into_iter().collect(),
        }
    }
}
