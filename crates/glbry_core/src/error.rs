//! Error types for gitlbry.
//!
//! Every fallible operation in the crate returns [`GlbryError`]. The startup
//! sequence and the protocol loop propagate these unchanged to the binary,
//! which reports them and exits non-zero. The one exception is `push`, which
//! reports a failed batch through the protocol's `error <ref>` lines instead.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, GlbryError>;

/// Errors raised by gitlbry operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GlbryError {
    /// The string is not a well-formed `lbry://` address.
    #[error("invalid lbry url: {0}")]
    InvalidAddress(String),

    /// The address names a channel where a repository (content) was expected.
    #[error("{0} refers to a channel, expected a repository url (lbry://@channel/repo)")]
    NotAContentAddress(String),

    /// The address names content where a channel was expected.
    #[error("{0} refers to a stream, expected a channel url")]
    NotAChannelAddress(String),

    /// Another process holds the lock for this repository.
    #[error("repository is locked by another process (pid {pid:?}); remove {} if it is stale", path.display())]
    LockContention {
        /// Lock file path.
        path: PathBuf,
        /// Process id recorded by the holder, when readable.
        pid: Option<u32>,
    },

    /// Pushing requires a channel to publish with.
    #[error("no publishing channel configured; run `gitlbry me <channel>` first")]
    NoPublishingChannelConfigured,

    /// The caller does not own the claim it tried to modify or publish as.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// `gitlbry init` on an address that already resolves.
    #[error("a repository already exists at {0}")]
    RepoExists(String),

    /// The settings document has a format version this build cannot read.
    #[error("unsupported repository settings version {0} (expected 1)")]
    UnsupportedSettings(i64),

    /// Transport-level failure talking to the content network.
    #[error("network error: {0}")]
    Network(String),

    /// The lbrynet daemon answered with a JSON-RPC or SDK error.
    #[error("lbrynet error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code, or 0 for per-item SDK errors.
        code: i64,
        /// Error text from the daemon.
        message: String,
    },

    /// An external `git` command exited unsuccessfully.
    #[error("`git {command}` failed ({status}): {stderr}")]
    Subprocess {
        /// Arguments passed to git.
        command: String,
        /// Exit status description.
        status: String,
        /// Trimmed stderr output.
        stderr: String,
    },

    /// Failed to read a file.
    #[error("failed to read {}: {source}", path.display())]
    FileRead {
        /// The file path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Failed to write a file.
    #[error("failed to write {}: {source}", path.display())]
    FileWrite {
        /// The file path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Other local I/O failure (stdin/stdout, process spawn).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON from disk or the network.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// User configuration could not be loaded or saved.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unexpected input on the remote-helper protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl GlbryError {
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GlbryError::FileRead {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GlbryError::FileWrite {
            path: path.into(),
            source,
        }
    }
}
