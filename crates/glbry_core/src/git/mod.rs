//! The git operations gitlbry needs, behind a trait.
//!
//! The remote helper never touches git's object store directly. Everything
//! goes through [`GitToolchain`]; [`GitCli`] implements it by shelling out
//! to the system `git`.

mod cli;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{GlbryError, Result};

pub use cli::GitCli;

/// A 20-byte SHA-1 object name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parse 40 hex digits.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(hex_str, &mut bytes)
            .map_err(|e| GlbryError::Protocol(format!("bad object id {hex_str:?}: {e}")))?;
        Ok(Self(bytes))
    }
}

impl FromStr for ObjectId {
    type Err = GlbryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({self})")
    }
}

/// A ref in the local mirror, e.g. `refs/heads/main`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedRef {
    pub name: String,
    pub id: ObjectId,
}

/// Capabilities of the version-control toolchain.
///
/// `mirror` is always the bare local mirror clone. Operations that talk to
/// the user's repository (`push_local`, `fetch_objects`) run in the current
/// directory, where git starts the remote helper.
pub trait GitToolchain {
    /// Every ref in `repo`. An empty repository has none.
    fn show_refs(&self, repo: &Path) -> Result<Vec<NamedRef>>;

    /// HEAD of `repo`: `@<refname>` when symbolic, otherwise the hex id.
    fn read_head(&self, repo: &Path) -> Result<String>;

    /// Write a bundle of `refs` to `out`, excluding history reachable from
    /// `exclude`.
    fn create_bundle(
        &self,
        repo: &Path,
        out: &Path,
        refs: &[String],
        exclude: &[ObjectId],
    ) -> Result<()>;

    /// Apply `bundle` to `repo`, storing its objects and updating its refs.
    fn unbundle(&self, repo: &Path, bundle: &Path) -> Result<()>;

    /// `git push <mirror> <spec>` from the user's repository.
    fn push_local(&self, mirror: &Path, spec: &str) -> Result<()>;

    /// Copy the objects named by `ids` from `mirror` into the user's
    /// repository.
    fn fetch_objects(&self, mirror: &Path, ids: &[ObjectId]) -> Result<()>;

    /// Create an empty bare repository at `repo`.
    fn init_bare(&self, repo: &Path) -> Result<()>;

    /// Point `name` in `repo` at `id`, or delete it when `id` is `None`.
    fn update_ref(&self, repo: &Path, name: &str, id: Option<ObjectId>) -> Result<()>;

    /// Whether `ancestor` is `descendant` or reachable from it.
    fn is_ancestor(&self, repo: &Path, ancestor: ObjectId, descendant: ObjectId) -> Result<bool>;

    /// Parents of commit `id`; empty for a root commit.
    fn parents(&self, repo: &Path, id: ObjectId) -> Result<Vec<ObjectId>>;
}

/// Parse `git show-ref` output (`<hex> <refname>` per line).
pub fn parse_show_ref(output: &str) -> Result<Vec<NamedRef>> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let (id, name) = line.split_once(' ').ok_or_else(|| {
                GlbryError::Protocol(format!("unexpected git show-ref line: {line:?}"))
            })?;
            Ok(NamedRef {
                name: name.trim().to_string(),
                id: id.parse()?,
            })
        })
        .collect()
}

/// Turn the contents of a `HEAD` file into the form the remote-helper
/// `list` command expects.
pub fn format_head(contents: &str) -> String {
    let head = contents.trim_end();
    match head.strip_prefix("ref: ") {
        Some(target) => format!("@{}", target.trim()),
        None => head.to_string(),
    }
}
