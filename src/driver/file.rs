//! Advisory file lock driver.
//!
//! Each label maps to `<dir>/<sha256(label)>`. Acquiring opens that file and
//! takes a non-blocking exclusive lock on it; the open handle is what keeps
//! the lock alive, so it is stored until release. The holder writes its
//! [`HolderMetadata`] into the file for anyone inspecting the lock.

use super::keys::sha256_hex;
use super::{HolderMetadata, LockDriver};
use crate::error::{CriticalSectionError, Result};
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Lock driver backed by OS advisory file locks.
#[derive(Debug)]
pub struct FileDriver {
    lock_dir: PathBuf,
    handles: HashMap<String, File>,
}

impl FileDriver {
    /// Create a driver storing lock files in `lock_dir`.
    ///
    /// The directory is created if it does not exist yet.
    pub fn new<P: Into<PathBuf>>(lock_dir: P) -> Result<Self> {
        let lock_dir = lock_dir.into();
        if !lock_dir.is_dir() {
            fs::create_dir_all(&lock_dir).map_err(|source| {
                CriticalSectionError::LockDirectory {
                    path: lock_dir.clone(),
                    source,
                }
            })?;
        }

        Ok(Self {
            lock_dir,
            handles: HashMap::new(),
        })
    }

    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }

    /// Path of the lock file for `label`.
    pub fn lock_path(&self, label: &str) -> PathBuf {
        self.lock_dir.join(sha256_hex(label))
    }

    /// Read who currently holds `label`, if anyone wrote metadata for it.
    pub fn holder(&self, label: &str) -> Result<Option<HolderMetadata>> {
        let path = self.lock_path(label);
        if !path.exists() {
            return Ok(None);
        }
        HolderMetadata::from_file(&path)
    }

    fn write_metadata(file: &mut File, label: &str) -> Result<()> {
        let json = HolderMetadata::new(label).to_json()?;
        let write = |file: &mut File| -> io::Result<()> {
            file.set_len(0)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()
        };
        write(file).map_err(|e| CriticalSectionError::io("failed to write lock metadata", e))
    }
}

impl LockDriver for FileDriver {
    fn acquire_lock(&mut self, label: &str) -> Result<bool> {
        let path = self.lock_path(label);

        // Never truncate on open: the file may belong to the current holder.
        let mut file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) => {
                warn!(label, path = %path.display(), error = %e, "failed to open lock file");
                return Ok(false);
            }
        };

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(ref e) if is_contended(e) => {
                debug!(label, path = %path.display(), "lock file held by another handle");
                return Ok(false);
            }
            Err(e) => {
                warn!(label, path = %path.display(), error = %e, "failed to lock file");
                return Ok(false);
            }
        }

        if let Err(e) = Self::write_metadata(&mut file, label) {
            warn!(label, path = %path.display(), error = %e, "lock taken without holder metadata");
        }

        debug!(label, path = %path.display(), "acquired file lock");
        self.handles.insert(label.to_string(), file);
        Ok(true)
    }

    fn release_lock(&mut self, label: &str) -> Result<bool> {
        let Some(file) = self.handles.get(label) else {
            return Ok(false);
        };

        if let Err(e) = file.set_len(0) {
            warn!(label, error = %e, "failed to clear lock metadata");
        }
        if let Err(e) = FileExt::unlock(file) {
            warn!(label, error = %e, "failed to unlock lock file");
            return Ok(false);
        }

        self.handles.remove(label);
        debug!(label, "released file lock");
        Ok(true)
    }
}
