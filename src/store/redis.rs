//! Redis adapter for [`KeyValueStore`].
//!
//! Batches run as `MULTI`/`EXEC` transactions. Redis never blocks inside a
//! transaction (`BLPOP` there behaves like `LPOP`), so a batch led by a
//! blocking pop first runs whole, with a plain `LPOP`, as one transaction.
//! Only when that pop finds the list empty does the adapter wait with a
//! standalone `BLPOP`, and the rest of the batch runs again, as a second
//! transaction, only if the wait actually produced a value.

use super::{Batch, Command, KeyValueStore, Reply, StoreError, StoreResult};
use ::redis::{Connection, FromRedisValue, Pipeline, RedisError, Value};
use std::time::Duration;
use tracing::debug;

fn map_err(e: RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
    {
        StoreError::Transport(e.to_string())
    } else {
        StoreError::Command(e.to_string())
    }
}

fn integer_reply(value: &Value) -> Reply {
    match i64::from_redis_value(value) {
        Ok(n) => Reply::Integer(n),
        Err(e) => Reply::Error(e.to_string()),
    }
}

fn popped_reply(value: &Value) -> Reply {
    match Option::<String>::from_redis_value(value) {
        Ok(popped) => Reply::Popped(popped),
        Err(e) => Reply::Error(e.to_string()),
    }
}

/// `MULTI`/`EXEC` pipeline for `commands`. Pops never block in here.
fn transaction_pipeline(commands: &[Command]) -> Pipeline {
    let mut pipe = ::redis::pipe();
    pipe.atomic();
    for command in commands {
        match command {
            Command::Del { key } => {
                pipe.cmd("DEL").arg(key);
            }
            Command::SAdd { key, member } => {
                pipe.cmd("SADD").arg(key).arg(member);
            }
            Command::SRem { key, member } => {
                pipe.cmd("SREM").arg(key).arg(member);
            }
            Command::RPush { key, value } => {
                pipe.cmd("RPUSH").arg(key).arg(value);
            }
            Command::BLPop { key, .. } => {
                pipe.cmd("LPOP").arg(key);
            }
        }
    }
    pipe
}

/// Map the values of an executed transaction back onto its commands.
fn transaction_replies(commands: &[Command], values: &[Value]) -> StoreResult<Vec<Reply>> {
    if values.len() != commands.len() {
        return Err(StoreError::Command(format!(
            "transaction returned {} replies for {} commands",
            values.len(),
            commands.len()
        )));
    }

    Ok(commands
        .iter()
        .zip(values)
        .map(|(command, value)| match command {
            Command::BLPop { .. } => popped_reply(value),
            _ => integer_reply(value),
        })
        .collect())
}

/// Key and timeout to wait on when a batch led by a blocking pop came back
/// empty-handed from its transaction.
fn pending_wait<'a>(commands: &'a [Command], replies: &[Reply]) -> Option<(&'a str, Duration)> {
    match (commands.first(), replies.first()) {
        (Some(Command::BLPop { key, timeout }), Some(Reply::Popped(None)))
            if !timeout.is_zero() =>
        {
            Some((key.as_str(), *timeout))
        }
        _ => None,
    }
}

/// Round trips a batch is made of.
trait Session {
    /// Run `commands` as one transaction.
    fn transaction(&mut self, commands: &[Command]) -> StoreResult<Vec<Reply>>;

    /// Wait up to `timeout` for the head of the list at `key`.
    fn blocking_pop(&mut self, key: &str, timeout: Duration) -> StoreResult<Option<String>>;
}

fn exec_batch<S: Session>(session: &mut S, commands: &[Command]) -> StoreResult<Vec<Reply>> {
    if commands.is_empty() {
        return Ok(Vec::new());
    }

    let replies = session.transaction(commands)?;
    let Some((key, timeout)) = pending_wait(commands, &replies) else {
        return Ok(replies);
    };

    debug!(key, "list empty inside transaction, waiting outside it");
    match session.blocking_pop(key, timeout)? {
        // The rest of the batch already ran atomically with the empty pop.
        None => Ok(replies),
        Some(value) => {
            let mut replies = vec![Reply::Popped(Some(value))];
            let rest = &commands[1..];
            if !rest.is_empty() {
                replies.extend(session.transaction(rest)?);
            }
            Ok(replies)
        }
    }
}

/// [`KeyValueStore`] backed by a synchronous Redis connection.
pub struct RedisStore {
    connection: Connection,
}

impl RedisStore {
    /// Connect to the Redis server at `url` (e.g. `redis://127.0.0.1:6379/`).
    pub fn open(url: &str) -> StoreResult<Self> {
        let client = ::redis::Client::open(url).map_err(map_err)?;
        let connection = client.get_connection().map_err(map_err)?;
        debug!(url, "connected to redis");
        Ok(Self::from_connection(connection))
    }

    pub fn from_connection(connection: Connection) -> Self {
        Self { connection }
    }

    fn lpop(&mut self, key: &str) -> StoreResult<Option<String>> {
        ::redis::cmd("LPOP")
            .arg(key)
            .query(&mut self.connection)
            .map_err(map_err)
    }
}

impl Session for RedisStore {
    fn transaction(&mut self, commands: &[Command]) -> StoreResult<Vec<Reply>> {
        let values: Vec<Value> = transaction_pipeline(commands)
            .query(&mut self.connection)
            .map_err(map_err)?;
        transaction_replies(commands, &values)
    }

    fn blocking_pop(&mut self, key: &str, timeout: Duration) -> StoreResult<Option<String>> {
        KeyValueStore::blpop(self, key, timeout)
    }
}

impl KeyValueStore for RedisStore {
    fn sadd(&mut self, key: &str, member: &str) -> StoreResult<bool> {
        let added: i64 = ::redis::cmd("SADD")
            .arg(key)
            .arg(member)
            .query(&mut self.connection)
            .map_err(map_err)?;
        Ok(added > 0)
    }

    fn sismember(&mut self, key: &str, member: &str) -> StoreResult<bool> {
        ::redis::cmd("SISMEMBER")
            .arg(key)
            .arg(member)
            .query(&mut self.connection)
            .map_err(map_err)
    }

    fn srem(&mut self, key: &str, member: &str) -> StoreResult<bool> {
        let removed: i64 = ::redis::cmd("SREM")
            .arg(key)
            .arg(member)
            .query(&mut self.connection)
            .map_err(map_err)?;
        Ok(removed > 0)
    }

    fn rpush(&mut self, key: &str, value: &str) -> StoreResult<u64> {
        ::redis::cmd("RPUSH")
            .arg(key)
            .arg(value)
            .query(&mut self.connection)
            .map_err(map_err)
    }

    fn blpop(&mut self, key: &str, timeout: Duration) -> StoreResult<Option<String>> {
        // BLPOP treats 0 as "wait forever".
        if timeout.is_zero() {
            return self.lpop(key);
        }
        let popped: Option<(String, String)> = ::redis::cmd("BLPOP")
            .arg(key)
            .arg(timeout.as_secs_f64())
            .query(&mut self.connection)
            .map_err(map_err)?;
        Ok(popped.map(|(_, value)| value))
    }

    fn exec(&mut self, batch: &Batch) -> StoreResult<Vec<Reply>> {
        exec_batch(self, batch.commands())
    }
}
