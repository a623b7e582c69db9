//! Single-writer guard for index runs
//!
//! At most one index or rebuild may run against a data directory at a
//! time; readers are unaffected. The lock is an exclusive flock on a file
//! in the data dir, released when the guard drops (including on crash,
//! since the OS releases it with the process).

use crate::error::{MindsongError, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

const LOCK_FILE: &str = "index.lock";

/// Held for the duration of one index run
pub struct IndexLock {
    _lock_file: File,
    path: PathBuf,
}

impl IndexLock {
    /// Attempt to acquire the writer lock (non-blocking).
    pub fn try_acquire(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| MindsongError::Io {
            source: e,
            context: format!("Failed to create data directory: {:?}", data_dir),
        })?;

        let path = data_dir.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| MindsongError::Io {
                source: e,
                context: format!("Failed to open lock file: {:?}", path),
            })?;

        match lock_file.try_lock_exclusive() {
            Ok(()) => {
                debug!("Acquired index writer lock at {:?}", path);
                Ok(Self {
                    _lock_file: lock_file,
                    path,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                Err(MindsongError::IndexLocked { path })
            }
            Err(e) => Err(MindsongError::Io {
                source: e,
                context: format!("Failed to lock {:?}", path),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        debug!("Released index writer lock at {:?}", self.path);
    }
}
