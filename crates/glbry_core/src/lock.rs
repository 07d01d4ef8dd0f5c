//! Exclusive per-repository lock.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GlbryError, Result};

/// Contents of the lock file, for diagnosing stale locks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMeta {
    pub pid: u32,
    pub started_at: i64,
}

/// Held for the whole lifetime of a remote-helper process. The lock file is
/// removed when the guard is dropped.
#[derive(Debug)]
pub struct RepoLock {
    path: PathBuf,
    meta: LockMeta,
    released: bool,
}

impl RepoLock {
    /// Create the lock file at `path`, failing immediately with
    /// [`GlbryError::LockContention`] if it already exists.
    pub fn acquire(path: &Path) -> Result<Self> {
        let meta = LockMeta {
            pid: std::process::id(),
            started_at: chrono::Utc::now().timestamp(),
        };

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(GlbryError::LockContention {
                    path: path.to_path_buf(),
                    pid: read_meta(path).map(|m| m.pid),
                });
            }
            Err(err) => return Err(GlbryError::write(path, err)),
        };

        let bytes = serde_json::to_vec(&meta)?;
        if let Err(err) = file.write_all(&bytes).and_then(|_| file.sync_all()) {
            let _ = fs::remove_file(path);
            return Err(GlbryError::write(path, err));
        }
        debug!(path = %path.display(), pid = meta.pid, "acquired repository lock");

        Ok(Self {
            path: path.to_path_buf(),
            meta,
            released: false,
        })
    }

    pub fn meta(&self) -> &LockMeta {
        &self.meta
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the lock file now, reporting any failure.
    pub fn release(mut self) -> Result<()> {
        if !self.released {
            self.released = true;
            fs::remove_file(&self.path).map_err(|e| GlbryError::write(&self.path, e))?;
        }
        Ok(())
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn read_meta(path: &Path) -> Option<LockMeta> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_contention() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lock");
        let held = RepoLock::acquire(&path).unwrap();
        assert_eq!(held.meta().pid, std::process::id());

        match RepoLock::acquire(&path).unwrap_err() {
            GlbryError::LockContention { path: p, pid } => {
                assert_eq!(p, path);
                assert_eq!(pid, Some(std::process::id()));
            }
            other => panic!("expected contention, got {other:?}"),
        }
    }

    #[test]
    fn test_drop_releases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lock");
        {
            let _lock = RepoLock::acquire(&path).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
        RepoLock::acquire(&path).unwrap().release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_garbage_lock_file_still_contends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lock");
        fs::write(&path, "junk").unwrap();
        let err = RepoLock::acquire(&path).unwrap_err();
        assert!(matches!(err, GlbryError::LockContention { pid: None, .. }));
        assert!(path.exists());
    }
}
