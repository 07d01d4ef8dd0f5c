//! Repository identity and the local on-disk layout derived from it.
//!
//! Every piece of local state for a remote lives under
//! `<root>/<local_key>/`, where `local_key` is the hex SHA-1 of the
//! normalized address:
//!
//! ```text
//! <root>/<local_key>/
//!   lock            exclusive lock held for the life of the process
//!   settings.json   repository settings, downloaded fresh on startup
//!   sync.json       SyncState
//!   in/<n>.bundle   downloaded chain bundles (immutable once written)
//!   out/<n>.bundle  bundles produced by push before upload
//!   mirror.git/     bare local mirror clone
//! ```

use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};

use crate::error::{GlbryError, Result};
use crate::url::LbryUrl;

/// Directory name used when git does not provide `GIT_DIR`.
pub const DEFAULT_ROOT: &str = ".glbry";

/// Stable identity of a remote repository for one process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoIdentity {
    address: LbryUrl,
    content_name: String,
    local_key: String,
}

impl RepoIdentity {
    /// Derive the identity of a repository address.
    ///
    /// The address must name content (`lbry://repo` or
    /// `lbry://@channel/repo`); channel-only addresses are rejected.
    pub fn from_address(raw: &str) -> Result<Self> {
        let address = LbryUrl::parse_lenient(raw)?;
        Self::from_url(address)
    }

    /// Derive the identity of an already-parsed address.
    pub fn from_url(address: LbryUrl) -> Result<Self> {
        let content_name = address
            .content_name()
            .ok_or_else(|| GlbryError::NotAContentAddress(address.to_string()))?
            .to_string();
        let local_key = local_key(address.as_str());
        Ok(Self {
            address,
            content_name,
            local_key,
        })
    }

    /// The normalized repository address.
    pub fn address(&self) -> &LbryUrl {
        &self.address
    }

    /// The content (stream) name; bundle names are `<content_name>-<n>`.
    pub fn content_name(&self) -> &str {
        &self.content_name
    }

    /// Filesystem-safe key namespacing all local state.
    pub fn local_key(&self) -> &str {
        &self.local_key
    }

    /// Name of the bundle occupying chain slot `index`.
    pub fn bundle_name(&self, index: u64) -> String {
        format!("{}-{}", self.content_name, index)
    }
}

/// Hex SHA-1 of an already-normalized address.
fn local_key(normalized: &str) -> String {
    let digest = Sha1::digest(normalized.as_bytes());
    hex::encode(digest)
}

/// Pick the directory that holds per-repository state.
///
/// An explicit `data_dir` wins; otherwise state goes inside the calling
/// repository's git directory (git exports `GIT_DIR` to remote helpers),
/// falling back to [`DEFAULT_ROOT`] in the working directory.
pub fn local_root(data_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = data_dir {
        return dir.to_path_buf();
    }
    match std::env::var_os("GIT_DIR") {
        Some(git_dir) if !git_dir.is_empty() => PathBuf::from(git_dir).join("lbry"),
        _ => PathBuf::from(DEFAULT_ROOT),
    }
}

/// Paths of every local artifact for one repository.
#[derive(Debug, Clone)]
pub struct RepoLayout {
    root: PathBuf,
}

impl RepoLayout {
    /// Layout for `identity` under `base`. The result is absolute so that
    /// git subprocesses running in other directories see the same paths.
    pub fn new(base: &Path, identity: &RepoIdentity) -> Result<Self> {
        let joined = base.join(identity.local_key());
        let root = std::path::absolute(&joined).map_err(|e| GlbryError::read(&joined, e))?;
        Ok(Self { root })
    }

    /// Directory holding everything for this repository.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lock file path.
    pub fn lock_path(&self) -> PathBuf {
        self.root.join("lock")
    }

    /// Downloaded settings document.
    pub fn settings_path(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    /// Persisted [`SyncState`](crate::sync_state::SyncState).
    pub fn sync_path(&self) -> PathBuf {
        self.root.join("sync.json")
    }

    /// Directory of downloaded bundles.
    pub fn in_dir(&self) -> PathBuf {
        self.root.join("in")
    }

    /// Directory of bundles awaiting upload.
    pub fn out_dir(&self) -> PathBuf {
        self.root.join("out")
    }

    /// Downloaded bundle for chain slot `index`.
    pub fn in_bundle_path(&self, index: u64) -> PathBuf {
        self.in_dir().join(format!("{index}.bundle"))
    }

    /// Outgoing bundle for chain slot `index`.
    pub fn out_bundle_path(&self, index: u64) -> PathBuf {
        self.out_dir().join(format!("{index}.bundle"))
    }

    /// Bare mirror clone.
    pub fn mirror_path(&self) -> PathBuf {
        self.root.join("mirror.git")
    }
}
