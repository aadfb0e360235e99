//! Tests for the remote-store lock driver.

use super::*;
use crate::error::CriticalSectionError;
use crate::store::{Batch, Command, KeyValueStore, MemoryStore, Reply, StoreError, StoreResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

const SHORT: Duration = Duration::from_millis(50);

fn driver(store: &MemoryStore) -> RemoteStoreDriver<MemoryStore> {
    RemoteStoreDriver::new(store.clone()).with_acquire_timeout(SHORT)
}

/// Store wrapper that counts seeding batches and can break chosen commands.
#[derive(Clone, Default)]
struct InstrumentedStore {
    inner: MemoryStore,
    init_batches: Arc<AtomicUsize>,
    fail_pushes_in_batch: bool,
    fail_transport: bool,
}

impl InstrumentedStore {
    fn is_init_batch(batch: &Batch) -> bool {
        matches!(batch.commands().first(), Some(Command::Del { .. }))
    }
}

impl KeyValueStore for InstrumentedStore {
    fn sadd(&mut self, key: &str, member: &str) -> StoreResult<bool> {
        if self.fail_transport {
            return Err(StoreError::Transport("connection refused".to_string()));
        }
        self.inner.sadd(key, member)
    }

    fn sismember(&mut self, key: &str, member: &str) -> StoreResult<bool> {
        self.inner.sismember(key, member)
    }

    fn srem(&mut self, key: &str, member: &str) -> StoreResult<bool> {
        self.inner.srem(key, member)
    }

    fn rpush(&mut self, key: &str, value: &str) -> StoreResult<u64> {
        self.inner.rpush(key, value)
    }

    fn blpop(&mut self, key: &str, timeout: Duration) -> StoreResult<Option<String>> {
        self.inner.blpop(key, timeout)
    }

    fn exec(&mut self, batch: &Batch) -> StoreResult<Vec<Reply>> {
        if Self::is_init_batch(batch) {
            self.init_batches.fetch_add(1, Ordering::SeqCst);
        }
        let mut replies = self.inner.exec(batch)?;
        if self.fail_pushes_in_batch {
            for (command, reply) in batch.commands().iter().zip(replies.iter_mut()) {
                if matches!(command, Command::RPush { .. }) {
                    *reply = Reply::Error("OOM command not allowed".to_string());
                }
            }
        }
        Ok(replies)
    }
}

#[test]
fn lock_key_appends_suffix_and_namespace() {
    let store = MemoryStore::new();
    assert_eq!(driver(&store).lock_key("orders"), "orders:lock");
    assert_eq!(
        driver(&store).with_namespace("app:").lock_key("orders"),
        "app:orders:lock"
    );
}

#[test]
fn default_timeout_is_one_second() {
    let driver = RemoteStoreDriver::new(MemoryStore::new());
    assert_eq!(driver.acquire_timeout(), Duration::from_secs(1));
}

#[test]
fn first_acquire_initializes_and_takes_token() {
    let store = MemoryStore::new();
    let mut driver = driver(&store);

    assert!(driver.acquire_lock("a").unwrap());

    assert_eq!(store.smembers("a:lock:initialized"), vec!["a:lock".to_string()]);
    assert_eq!(store.llen("a:lock"), 0);
    assert!(store.smembers("a:lock:released").is_empty());
}

#[test]
fn acquire_of_held_label_times_out_with_false() {
    let store = MemoryStore::new();
    let mut holder = driver(&store);
    let mut contender = driver(&store);

    assert!(holder.acquire_lock("a").unwrap());
    let start = Instant::now();
    assert!(!contender.acquire_lock("a").unwrap());
    assert!(start.elapsed() >= SHORT);
}

#[test]
fn zero_timeout_fails_immediately_on_held_label() {
    let store = MemoryStore::new();
    let mut holder = driver(&store);
    let mut contender = RemoteStoreDriver::new(store.clone()).with_acquire_timeout(Duration::ZERO);

    assert!(holder.acquire_lock("a").unwrap());
    let start = Instant::now();
    assert!(!contender.acquire_lock("a").unwrap());
    assert!(start.elapsed() < Duration::from_millis(100));
}

#[test]
fn release_then_acquire_hands_lock_over() {
    let store = MemoryStore::new();
    let mut first = driver(&store);
    let mut second = driver(&store);

    assert!(first.acquire_lock("a").unwrap());
    assert!(first.release_lock("a").unwrap());
    assert_eq!(store.llen("a:lock"), 1);
    assert!(second.acquire_lock("a").unwrap());
    assert_eq!(store.llen("a:lock"), 0);
}

#[test]
fn double_release_returns_false_and_keeps_one_token() {
    let store = MemoryStore::new();
    let mut driver = driver(&store);

    assert!(driver.acquire_lock("a").unwrap());
    assert!(driver.release_lock("a").unwrap());
    assert!(!driver.release_lock("a").unwrap());
    assert_eq!(store.llen("a:lock"), 1);
}

#[test]
fn release_without_any_acquire_is_rejected_without_mutation() {
    let store = MemoryStore::new();
    let mut driver = driver(&store);

    assert!(!driver.release_lock("never").unwrap());
    assert!(!store.contains_key("never:lock"));
    assert!(!store.contains_key("never:lock:initialized"));
    assert!(!store.contains_key("never:lock:released"));
}

#[test]
fn stray_release_after_release_is_rejected() {
    let store = MemoryStore::new();
    let mut holder = driver(&store);
    let mut other = driver(&store);

    assert!(holder.acquire_lock("a").unwrap());
    assert!(holder.release_lock("a").unwrap());
    // Free again: the released marker blocks a stray release.
    assert!(!other.release_lock("a").unwrap());
    assert_eq!(store.llen("a:lock"), 1);
}

#[test]
fn failed_marker_removal_on_acquire_is_fatal() {
    let mut store = MemoryStore::new();
    let mut driver = driver(&store);
    assert!(driver.acquire_lock("a").unwrap());
    assert!(driver.release_lock("a").unwrap());

    let corrupt = Batch::new()
        .del("a:lock:released")
        .rpush("a:lock:released", "1");
    store.exec(&corrupt).unwrap();

    match driver.acquire_lock("a").unwrap_err() {
        CriticalSectionError::Acquire { label, source } => {
            assert_eq!(label, "a");
            assert!(matches!(source, StoreError::Command(ref m) if m.starts_with("WRONGTYPE")));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn blocked_acquire_succeeds_when_holder_releases() {
    let store = MemoryStore::new();
    let mut holder = driver(&store);
    assert!(holder.acquire_lock("a").unwrap());

    let mut waiter = RemoteStoreDriver::new(store.clone()).with_acquire_timeout(Duration::from_secs(5));
    let handle = thread::spawn(move || waiter.acquire_lock("a").unwrap());

    thread::sleep(Duration::from_millis(100));
    assert!(holder.release_lock("a").unwrap());
    assert!(handle.join().unwrap());
    assert_eq!(store.llen("a:lock"), 0);
}

#[test]
fn namespaces_isolate_labels() {
    let store = MemoryStore::new();
    let mut blue = driver(&store).with_namespace("blue:");
    let mut green = driver(&store).with_namespace("green:");

    assert!(blue.acquire_lock("a").unwrap());
    assert!(green.acquire_lock("a").unwrap());
}

#[test]
fn concurrent_first_acquire_initializes_once_and_admits_one_holder() {
    const CONTENDERS: usize = 8;

    let store = InstrumentedStore::default();
    let barrier = Arc::new(Barrier::new(CONTENDERS));
    let holders = Arc::new(AtomicUsize::new(0));
    let max_holders = Arc::new(AtomicUsize::new(0));
    let acquired = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..CONTENDERS)
        .map(|_| {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            let holders = Arc::clone(&holders);
            let max_holders = Arc::clone(&max_holders);
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let mut driver =
                    RemoteStoreDriver::new(store).with_acquire_timeout(Duration::from_secs(5));
                barrier.wait();
                if driver.acquire_lock("shared").unwrap() {
                    let now = holders.fetch_add(1, Ordering::SeqCst) + 1;
                    max_holders.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    holders.fetch_sub(1, Ordering::SeqCst);
                    acquired.fetch_add(1, Ordering::SeqCst);
                    assert!(driver.release_lock("shared").unwrap());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.init_batches.load(Ordering::SeqCst), 1);
    assert_eq!(max_holders.load(Ordering::SeqCst), 1);
    assert_eq!(acquired.load(Ordering::SeqCst), CONTENDERS);
    assert_eq!(store.inner.llen("shared:lock"), 1);
}

#[test]
fn failed_initialization_batch_is_fatal_and_names_label() {
    let store = InstrumentedStore {
        fail_pushes_in_batch: true,
        ..Default::default()
    };
    let mut driver = RemoteStoreDriver::new(store).with_acquire_timeout(SHORT);

    let err = driver.acquire_lock("broken").unwrap_err();
    assert!(
        matches!(err, CriticalSectionError::Initialization { ref label, .. } if label == "broken")
    );
    assert!(err.to_string().contains("OOM"));
}

#[test]
fn failed_push_on_release_returns_false() {
    let inner = MemoryStore::new();
    let mut healthy = driver(&inner);
    assert!(healthy.acquire_lock("a").unwrap());

    let mut broken = RemoteStoreDriver::new(InstrumentedStore {
        inner,
        fail_pushes_in_batch: true,
        ..Default::default()
    });
    assert!(!broken.release_lock("a").unwrap());
}

#[test]
fn transport_failure_on_acquire_is_wrapped_with_label() {
    let store = InstrumentedStore {
        fail_transport: true,
        ..Default::default()
    };
    let mut driver = RemoteStoreDriver::new(store);

    let err = driver.acquire_lock("jobs").unwrap_err();
    match err {
        CriticalSectionError::Acquire { label, source } => {
            assert_eq!(label, "jobs");
            assert!(matches!(source, StoreError::Transport(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn boxed_driver_forwards_calls() {
    let store = MemoryStore::new();
    let mut boxed: Box<dyn LockDriver> = Box::new(driver(&store));

    assert!(boxed.acquire_lock("a").unwrap());
    assert!(boxed.release_lock("a").unwrap());
}
