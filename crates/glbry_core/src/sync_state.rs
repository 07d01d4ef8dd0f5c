//! Persisted chain progress for one repository.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{GlbryError, Result};

/// How far the local mirror has followed the bundle chain.
///
/// Invariant: `applied_index <= download_index`. Both indices only grow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// Number of bundles downloaded into the `in/` directory.
    pub download_index: u64,
    /// Hex SHA-1 of bundle `download_index - 1`, or `""` before the first.
    /// The next bundle in the chain must carry this as its description.
    pub download_prior_hash: String,
    /// Number of downloaded bundles unbundled into the mirror.
    pub applied_index: u64,
}

impl SyncState {
    /// Load the state at `path`.
    ///
    /// A missing or unreadable file yields the empty state; this never fails.
    pub fn load(path: &Path) -> Self {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!(path = %path.display(), "unreadable sync state, starting over: {e}");
                return Self::default();
            }
        };
        match serde_json::from_str::<SyncState>(&contents) {
            Ok(state) if state.applied_index <= state.download_index => state,
            Ok(state) => {
                warn!(?state, "sync state violates applied <= downloaded, starting over");
                Self::default()
            }
            Err(e) => {
                warn!(path = %path.display(), "corrupt sync state, starting over: {e}");
                Self::default()
            }
        }
    }

    /// Persist the state at `path`, replacing the previous file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| GlbryError::write(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| GlbryError::write(path, e))?;
        Ok(())
    }

    /// Number of downloaded bundles not yet applied. A file claiming more
    /// applied than downloaded has nothing pending.
    pub fn pending(&self) -> u64 {
        self.download_index.saturating_sub(self.applied_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = SyncState::load(&dir.path().join("sync.json"));
        assert_eq!(state, SyncState::default());
        assert_eq!(state.download_prior_hash, "");
    }

    #[test]
    fn test_garbage_file_is_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.json");
        fs::write(&path, "{not json").unwrap();
        assert_eq!(SyncState::load(&path), SyncState::default());
    }

    #[test]
    fn test_inconsistent_file_is_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.json");
        fs::write(
            &path,
            r#"{"download_index":1,"download_prior_hash":"ab","applied_index":2}"#,
        )
        .unwrap();
        assert_eq!(SyncState::load(&path), SyncState::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.json");
        let state = SyncState {
            download_index: 3,
            download_prior_hash: "c0ffee".into(),
            applied_index: 2,
        };
        state.save(&path).unwrap();
        assert_eq!(SyncState::load(&path), state);
        assert_eq!(state.pending(), 1);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_pending_with_applied_ahead() {
        let state = SyncState {
            download_index: 1,
            applied_index: 4,
            ..SyncState::default()
        };
        assert_eq!(state.pending(), 0);
    }

    #[test]
    fn test_save_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("sync.json");
        let err = SyncState::default().save(&path).unwrap_err();
        assert!(matches!(err, GlbryError::FileWrite { .. }));
    }
}
