//! System-V semaphore driver.
//!
//! Semaphores live in the kernel of one host, so this driver only coordinates
//! processes on the same machine (and not across containers with separate
//! IPC namespaces). Labels map to semaphore keys through CRC-32.

use super::LockDriver;
use super::keys::crc32;
use crate::error::{CriticalSectionError, Result};
use std::collections::HashMap;
use std::io;
use tracing::{debug, warn};

const PERMISSIONS: libc::c_int = 0o666;

fn semaphore_key(label: &str) -> libc::key_t {
    key_from_hash(crc32(label))
}

/// Key 0 is `IPC_PRIVATE`, which would hand every caller a fresh semaphore.
fn key_from_hash(hash: u32) -> libc::key_t {
    match hash as libc::key_t {
        libc::IPC_PRIVATE => 1,
        key => key,
    }
}

/// Open the semaphore for `key`, creating it with value 1 when missing.
fn open_semaphore(key: libc::key_t) -> io::Result<libc::c_int> {
    // IPC_EXCL makes exactly one creator responsible for the initial value.
    let id = unsafe { libc::semget(key, 1, libc::IPC_CREAT | libc::IPC_EXCL | PERMISSIONS) };
    if id >= 0 {
        if unsafe { libc::semctl(id, 0, libc::SETVAL, 1 as libc::c_int) } < 0 {
            return Err(io::Error::last_os_error());
        }
        return Ok(id);
    }

    let err = io::Error::last_os_error();
    if err.raw_os_error() != Some(libc::EEXIST) {
        return Err(err);
    }
    let id = unsafe { libc::semget(key, 1, PERMISSIONS) };
    if id < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(id)
    }
}

fn adjust(id: libc::c_int, delta: libc::c_short, flags: libc::c_int) -> io::Result<()> {
    let mut op = libc::sembuf {
        sem_num: 0,
        sem_op: delta,
        sem_flg: flags as libc::c_short,
    };
    if unsafe { libc::semop(id, &mut op, 1) } < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Lock driver backed by System-V semaphores.
///
/// Both directions use `SEM_UNDO`, so the kernel gives the slot back if the
/// holding process exits without releasing.
#[derive(Debug, Default)]
pub struct SemaphoreDriver {
    handles: HashMap<String, libc::c_int>,
}

impl SemaphoreDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delete the kernel semaphore behind `label`.
    ///
    /// Any process still holding or waiting on it sees its next call fail.
    pub fn remove(&mut self, label: &str) -> Result<()> {
        self.handles.remove(label);
        let id = unsafe { libc::semget(semaphore_key(label), 1, PERMISSIONS) };
        if id < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ENOENT) {
                return Ok(());
            }
            return Err(CriticalSectionError::Semaphore(err.to_string()));
        }
        if unsafe { libc::semctl(id, 0, libc::IPC_RMID) } < 0 {
            return Err(CriticalSectionError::Semaphore(
                io::Error::last_os_error().to_string(),
            ));
        }
        Ok(())
    }
}

impl LockDriver for SemaphoreDriver {
    fn acquire_lock(&mut self, label: &str) -> Result<bool> {
        let key = semaphore_key(label);
        let id = match open_semaphore(key) {
            Ok(id) => id,
            Err(e) => {
                warn!(label, key, error = %e, "failed to open semaphore");
                return Ok(false);
            }
        };

        match adjust(id, -1, libc::IPC_NOWAIT | libc::SEM_UNDO) {
            Ok(()) => {
                debug!(label, key, "acquired semaphore");
                self.handles.insert(label.to_string(), id);
                Ok(true)
            }
            Err(e) if matches!(e.raw_os_error(), Some(libc::EAGAIN) | Some(libc::EINTR)) => {
                debug!(label, key, "semaphore held elsewhere");
                Ok(false)
            }
            Err(e) => Err(CriticalSectionError::Semaphore(format!(
                "acquire of \"{}\" failed: {}",
                label, e
            ))),
        }
    }

    fn release_lock(&mut self, label: &str) -> Result<bool> {
        let Some(&id) = self.handles.get(label) else {
            return Ok(false);
        };

        if let Err(e) = adjust(id, 1, libc::SEM_UNDO) {
            warn!(label, error = %e, "failed to release semaphore");
            return Ok(false);
        }
        self.handles.remove(label);
        debug!(label, "released semaphore");
        Ok(true)
    }
}
