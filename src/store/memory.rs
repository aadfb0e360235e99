//! In-process key-value store.
//!
//! Every clone of a [`MemoryStore`] is a separate connection to the same
//! data, so threads holding their own clone behave like independent
//! processes sharing one server.

use super::{Batch, Command, KeyValueStore, Reply, StoreError, StoreResult};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Debug)]
enum Entry {
    Set(HashSet<String>),
    List(VecDeque<String>),
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
}

impl State {
    fn del(&mut self, key: &str) -> i64 {
        i64::from(self.entries.remove(key).is_some())
    }

    fn sadd(&mut self, key: &str, member: &str) -> Result<bool, String> {
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Set(HashSet::new()));
        match entry {
            Entry::Set(set) => Ok(set.insert(member.to_string())),
            Entry::List(_) => Err(WRONG_TYPE.to_string()),
        }
    }

    fn sismember(&self, key: &str, member: &str) -> Result<bool, String> {
        match self.entries.get(key) {
            None => Ok(false),
            Some(Entry::Set(set)) => Ok(set.contains(member)),
            Some(Entry::List(_)) => Err(WRONG_TYPE.to_string()),
        }
    }

    fn srem(&mut self, key: &str, member: &str) -> Result<bool, String> {
        let removed = match self.entries.get_mut(key) {
            None => return Ok(false),
            Some(Entry::Set(set)) => set.remove(member),
            Some(Entry::List(_)) => return Err(WRONG_TYPE.to_string()),
        };
        if matches!(self.entries.get(key), Some(Entry::Set(set)) if set.is_empty()) {
            self.entries.remove(key);
        }
        Ok(removed)
    }

    fn rpush(&mut self, key: &str, value: &str) -> Result<u64, String> {
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::List(VecDeque::new()));
        match entry {
            Entry::List(list) => {
                list.push_back(value.to_string());
                Ok(list.len() as u64)
            }
            Entry::Set(_) => Err(WRONG_TYPE.to_string()),
        }
    }

    fn lpop(&mut self, key: &str) -> Result<Option<String>, String> {
        let popped = match self.entries.get_mut(key) {
            None => return Ok(None),
            Some(Entry::List(list)) => list.pop_front(),
            Some(Entry::Set(_)) => return Err(WRONG_TYPE.to_string()),
        };
        if matches!(self.entries.get(key), Some(Entry::List(list)) if list.is_empty()) {
            self.entries.remove(key);
        }
        Ok(popped)
    }

    fn llen(&self, key: &str) -> usize {
        match self.entries.get(key) {
            Some(Entry::List(list)) => list.len(),
            _ => 0,
        }
    }

    fn smembers(&self, key: &str) -> Vec<String> {
        let mut members: Vec<String> = match self.entries.get(key) {
            Some(Entry::Set(set)) => set.iter().cloned().collect(),
            _ => Vec::new(),
        };
        members.sort();
        members
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    pushed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Pop from `key`, parking on the condition variable until a push lands
    /// or `timeout` runs out. The state lock is released while parked.
    fn wait_pop<'a>(
        &'a self,
        mut state: MutexGuard<'a, State>,
        key: &str,
        timeout: Duration,
    ) -> (MutexGuard<'a, State>, Result<Option<String>, String>) {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            match state.lpop(key) {
                Ok(None) => {}
                popped => return (state, popped),
            }

            state = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return (state, Ok(None));
                    }
                    self.pushed
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(|poison| poison.into_inner())
                        .0
                }
                None => self
                    .pushed
                    .wait(state)
                    .unwrap_or_else(|poison| poison.into_inner()),
            };
        }
    }

    fn exec(&self, batch: &Batch) -> Vec<Reply> {
        let mut state = self.lock();
        let mut replies = Vec::with_capacity(batch.len());
        let mut pushed = false;

        for command in batch.commands() {
            let reply = match command {
                Command::Del { key } => Reply::Integer(state.del(key)),
                Command::SAdd { key, member } => match state.sadd(key, member) {
                    Ok(added) => Reply::Integer(i64::from(added)),
                    Err(e) => Reply::Error(e),
                },
                Command::SRem { key, member } => match state.srem(key, member) {
                    Ok(removed) => Reply::Integer(i64::from(removed)),
                    Err(e) => Reply::Error(e),
                },
                Command::RPush { key, value } => match state.rpush(key, value) {
                    Ok(len) => {
                        pushed = true;
                        Reply::Integer(len as i64)
                    }
                    Err(e) => Reply::Error(e),
                },
                Command::BLPop { key, timeout } => {
                    let (guard, popped) = self.wait_pop(state, key, *timeout);
                    state = guard;
                    match popped {
                        Ok(value) => Reply::Popped(value),
                        Err(e) => Reply::Error(e),
                    }
                }
            };
            replies.push(reply);
        }

        drop(state);
        if pushed {
            self.pushed.notify_all();
        }
        replies
    }
}

/// Shared in-memory store with blocking-pop support.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of elements in the list at `key` (0 if missing).
    pub fn llen(&self, key: &str) -> usize {
        self.shared.lock().llen(key)
    }

    /// Sorted members of the set at `key` (empty if missing).
    pub fn smembers(&self, key: &str) -> Vec<String> {
        self.shared.lock().smembers(key)
    }

    /// Whether anything is stored under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.shared.lock().entries.contains_key(key)
    }
}

impl KeyValueStore for MemoryStore {
    fn sadd(&mut self, key: &str, member: &str) -> StoreResult<bool> {
        self.shared
            .lock()
            .sadd(key, member)
            .map_err(StoreError::Command)
    }

    fn sismember(&mut self, key: &str, member: &str) -> StoreResult<bool> {
        self.shared
            .lock()
            .sismember(key, member)
            .map_err(StoreError::Command)
    }

    fn srem(&mut self, key: &str, member: &str) -> StoreResult<bool> {
        self.shared
            .lock()
            .srem(key, member)
            .map_err(StoreError::Command)
    }

    fn rpush(&mut self, key: &str, value: &str) -> StoreResult<u64> {
        let len = self
            .shared
            .lock()
            .rpush(key, value)
            .map_err(StoreError::Command)?;
        self.shared.pushed.notify_all();
        Ok(len)
    }

    fn blpop(&mut self, key: &str, timeout: Duration) -> StoreResult<Option<String>> {
        let state = self.shared.lock();
        let (_state, popped) = self.shared.wait_pop(state, key, timeout);
        popped.map_err(StoreError::Command)
    }

    fn exec(&mut self, batch: &Batch) -> StoreResult<Vec<Reply>> {
        Ok(self.shared.exec(batch))
    }
}
