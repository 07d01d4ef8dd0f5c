//! Repository settings and the time-windowed authorization model.
//!
//! The settings document is published on the repository's own address and
//! lists which channels may publish bundles, and when. Each author carries
//! an increasing list of unix-second boundaries: even positions grant,
//! odd positions revoke, so `[100, 200, 300]` means authorized during
//! `[100, 200)` and from `300` on.
//!
//! Mutation only ever appends a boundary. History is never rewritten, so
//! any reader can re-check a bundle against the window that applied when
//! it was published.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{GlbryError, Result};

/// The only settings format this build understands.
pub const FORMAT_VERSION: i64 = 1;

/// Push permissions for one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorEntry {
    /// Claim id of the author's channel.
    #[serde(rename = "claim_id")]
    pub channel_id: String,
    /// Display name of the channel, e.g. `gitlbry`.
    pub channel_name: String,
    /// Strictly increasing grant/revoke boundaries (unix seconds).
    #[serde(rename = "ranges", default, deserialize_with = "null_as_default")]
    pub windows: Vec<i64>,
}

impl AuthorEntry {
    /// Whether this author may publish at `timestamp`.
    pub fn is_authorized(&self, timestamp: i64) -> bool {
        let mut pairs = self.windows.chunks_exact(2);
        if pairs.any(|w| w[0] <= timestamp && timestamp < w[1]) {
            return true;
        }
        match pairs.remainder() {
            [start] => *start <= timestamp,
            _ => false,
        }
    }

    /// An odd number of boundaries means the latest grant is still open.
    pub fn is_currently_granted(&self) -> bool {
        self.windows.len() % 2 == 1
    }

    fn append_boundary(&mut self, timestamp: i64) {
        // Keep the list strictly increasing even if clocks disagree.
        let at = match self.windows.last() {
            Some(&last) if timestamp <= last => last + 1,
            _ => timestamp,
        };
        self.windows.push(at);
    }
}

/// The repository settings document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSettings {
    /// Document format version, see [`FORMAT_VERSION`].
    #[serde(rename = "gitlbry")]
    pub format_version: i64,
    /// Every channel that has ever been granted push access.
    #[serde(default, deserialize_with = "null_as_default")]
    pub authors: Vec<AuthorEntry>,
    /// Claim ids invalidated by a maintainer.
    #[serde(
        rename = "deleted",
        alias = "Deleted",
        default,
        deserialize_with = "null_as_default"
    )]
    pub deleted_ids: BTreeSet<String>,
}

impl RepoSettings {
    /// Settings for a new repository with a single author granted at `now`.
    pub fn new_with_author(channel_id: &str, channel_name: &str, now: i64) -> Self {
        let mut settings = Self {
            format_version: FORMAT_VERSION,
            authors: Vec::new(),
            deleted_ids: BTreeSet::new(),
        };
        settings.grant(channel_id, channel_name, now);
        settings
    }

    /// Parse and validate a settings document.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: RepoSettings = serde_json::from_str(json)?;
        if settings.format_version != FORMAT_VERSION {
            return Err(GlbryError::UnsupportedSettings(settings.format_version));
        }
        Ok(settings)
    }

    /// Read and validate a settings document from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| GlbryError::read(path, e))?;
        Self::from_json(&json)
    }

    /// Serialize for publishing.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// The author entry for `channel_id`, if any.
    pub fn author(&self, channel_id: &str) -> Option<&AuthorEntry> {
        self.authors.iter().find(|a| a.channel_id == channel_id)
    }

    /// Claim ids of every listed author, the signer filter for chain search.
    pub fn author_ids(&self) -> Vec<String> {
        self.authors.iter().map(|a| a.channel_id.clone()).collect()
    }

    /// Whether `channel_id` may publish at `timestamp`. Unknown channels
    /// are never authorized.
    pub fn is_authorized(&self, channel_id: &str, timestamp: i64) -> bool {
        self.author(channel_id)
            .is_some_and(|author| author.is_authorized(timestamp))
    }

    /// Whether a maintainer invalidated `id`.
    pub fn is_deleted(&self, id: &str) -> bool {
        self.deleted_ids.contains(id)
    }

    /// Grant `channel_id` push access from `timestamp`.
    ///
    /// Returns `false` (and changes nothing) if the channel is already
    /// granted.
    pub fn grant(&mut self, channel_id: &str, channel_name: &str, timestamp: i64) -> bool {
        match self.authors.iter_mut().find(|a| a.channel_id == channel_id) {
            Some(author) if author.is_currently_granted() => false,
            Some(author) => {
                author.append_boundary(timestamp);
                true
            }
            None => {
                self.authors.push(AuthorEntry {
                    channel_id: channel_id.to_string(),
                    channel_name: channel_name.to_string(),
                    windows: vec![timestamp],
                });
                true
            }
        }
    }

    /// Revoke `channel_id` push access from `timestamp`.
    ///
    /// Returns `false` (and changes nothing) if the channel is unknown or
    /// already revoked.
    pub fn revoke(&mut self, channel_id: &str, timestamp: i64) -> bool {
        match self.authors.iter_mut().find(|a| a.channel_id == channel_id) {
            Some(author) if author.is_currently_granted() => {
                author.append_boundary(timestamp);
                true
            }
            _ => false,
        }
    }

    /// Tombstone a published claim so readers skip it.
    pub fn delete(&mut self, claim_id: &str) -> bool {
        self.deleted_ids.insert(claim_id.to_string())
    }
}

/// Older writers emit `null` for empty lists.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with(windows: Vec<i64>) -> RepoSettings {
        RepoSettings {
            format_version: FORMAT_VERSION,
            authors: vec![AuthorEntry {
                channel_id: "A1".into(),
                channel_name: "alice".into(),
                windows,
            }],
            deleted_ids: BTreeSet::new(),
        }
    }

    #[test]
    fn test_interval_boundaries() {
        let s = settings_with(vec![100, 200, 300]);
        assert!(!s.is_authorized("A1", 50));
        assert!(s.is_authorized("A1", 100));
        assert!(s.is_authorized("A1", 150));
        assert!(!s.is_authorized("A1", 200));
        assert!(!s.is_authorized("A1", 250));
        assert!(s.is_authorized("A1", 300));
        assert!(s.is_authorized("A1", 10_000));
    }

    #[test]
    fn test_closed_windows() {
        let s = settings_with(vec![100, 200]);
        assert!(s.is_authorized("A1", 199));
        assert!(!s.is_authorized("A1", 200));
        assert!(!s.is_authorized("A1", 10_000));
    }

    #[test]
    fn test_unknown_or_empty_is_unauthorized() {
        let s = settings_with(vec![]);
        assert!(!s.is_authorized("A1", 0));
        assert!(!s.is_authorized("B2", 150));
    }

    #[test]
    fn test_grant_creates_entry() {
        let mut s = settings_with(vec![]);
        assert!(s.grant("B2", "bob", 500));
        assert_eq!(s.author("B2").unwrap().windows, vec![500]);
        assert_eq!(s.author("B2").unwrap().channel_name, "bob");
    }

    #[test]
    fn test_grant_is_idempotent_while_granted() {
        let mut s = settings_with(vec![100]);
        assert!(!s.grant("A1", "alice", 200));
        assert_eq!(s.author("A1").unwrap().windows, vec![100]);
    }

    #[test]
    fn test_revoke_is_idempotent_while_revoked() {
        let mut s = settings_with(vec![100, 200]);
        assert!(!s.revoke("A1", 300));
        assert_eq!(s.author("A1").unwrap().windows, vec![100, 200]);
        assert!(!s.revoke("B2", 300));
        assert!(s.author("B2").is_none());
    }

    #[test]
    fn test_grant_revoke_cycle_appends() {
        let mut s = settings_with(vec![100]);
        assert!(s.revoke("A1", 200));
        assert!(s.grant("A1", "alice", 300));
        assert!(s.revoke("A1", 400));
        assert_eq!(s.author("A1").unwrap().windows, vec![100, 200, 300, 400]);
    }

    #[test]
    fn test_boundaries_stay_strictly_increasing() {
        let mut s = settings_with(vec![100]);
        s.revoke("A1", 90);
        assert_eq!(s.author("A1").unwrap().windows, vec![100, 101]);
    }

    #[test]
    fn test_deleted_ids() {
        let mut s = settings_with(vec![100]);
        assert!(!s.is_deleted("claim"));
        assert!(s.delete("claim"));
        assert!(!s.delete("claim"));
        assert!(s.is_deleted("claim"));
    }

    #[test]
    fn test_published_document_format() {
        let s = RepoSettings::new_with_author("e66aa0b4", "gitlbry", 1000);
        let value: serde_json::Value = serde_json::from_str(&s.to_json().unwrap()).unwrap();
        assert_eq!(value["gitlbry"], 1);
        assert_eq!(value["authors"][0]["claim_id"], "e66aa0b4");
        assert_eq!(value["authors"][0]["channel_name"], "gitlbry");
        assert_eq!(value["authors"][0]["ranges"][0], 1000);
        assert!(value["deleted"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_reads_legacy_document() {
        let json = r#"{"gitlbry":1,"authors":[{"claim_id":"A1","channel_name":"alice","ranges":null}],"Deleted":null}"#;
        let s = RepoSettings::from_json(json).unwrap();
        assert!(s.author("A1").unwrap().windows.is_empty());
        assert!(s.deleted_ids.is_empty());

        let json = r#"{"gitlbry":1,"authors":null,"Deleted":["x"]}"#;
        let s = RepoSettings::from_json(json).unwrap();
        assert!(s.authors.is_empty());
        assert!(s.is_deleted("x"));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let err = RepoSettings::from_json(r#"{"gitlbry":2,"authors":[]}"#).unwrap_err();
        assert!(matches!(err, GlbryError::UnsupportedSettings(2)));
    }
}
