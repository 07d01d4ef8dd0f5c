//! Bundle chain discovery, download and application.
//!
//! A repository's history is a chain of git bundles published as streams
//! named `<content>-0`, `<content>-1`, ... Bundle `n` carries the hex SHA-1
//! of bundle `n - 1` as its description (`""` for bundle 0), which turns
//! the network's unordered set of claims into a verifiable linked list.
//!
//! Discovery walks the chain from the last downloaded slot. For each slot
//! it searches for claims with the slot's name signed by any listed author,
//! oldest first, and accepts the first one that passes every check. If
//! none does, the chain ends there; that is the normal way sync finishes.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use sha1::{Digest, Sha1};
use tracing::{debug, info};

use crate::error::{GlbryError, Result};
use crate::git::GitToolchain;
use crate::identity::{RepoIdentity, RepoLayout};
use crate::lbry::{ContentNetwork, SearchItem, SearchQuery};
use crate::settings::RepoSettings;
use crate::sync_state::SyncState;

/// A bundle accepted into the chain, ready to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleDescriptor {
    pub sequence_index: u64,
    pub name: String,
    pub expected_prior_hash: String,
    pub claim_id: String,
    pub permanent_url: String,
    pub signer_channel_id: String,
    pub publish_timestamp: i64,
}

/// Why a search result was not accepted into the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NetworkError(String),
    Unsigned,
    Unconfirmed,
    Deleted,
    Unauthorized { signer: String, timestamp: i64 },
    IntegrityMismatch { expected: String, found: String },
}

/// Check one search result against the settings and the expected prior
/// hash for its slot.
pub fn check_candidate(
    item: &SearchItem,
    expected_prior_hash: &str,
    settings: &RepoSettings,
) -> std::result::Result<(String, i64), Rejection> {
    if let Some(error) = &item.error {
        return Err(Rejection::NetworkError(crate::lbry::types::error_text(error)));
    }
    let signer = match &item.signing_channel {
        Some(channel) => channel.claim_id.as_str(),
        None => return Err(Rejection::Unsigned),
    };
    if settings.is_deleted(&item.claim_id) || settings.is_deleted(signer) {
        return Err(Rejection::Deleted);
    }
    let timestamp = item.timestamp.ok_or(Rejection::Unconfirmed)?;
    if !settings.is_authorized(signer, timestamp) {
        return Err(Rejection::Unauthorized {
            signer: signer.to_string(),
            timestamp,
        });
    }
    if item.description() != expected_prior_hash {
        return Err(Rejection::IntegrityMismatch {
            expected: expected_prior_hash.to_string(),
            found: item.description().to_string(),
        });
    }
    Ok((signer.to_string(), timestamp))
}

/// Find the bundle occupying chain slot `index`, if any.
///
/// Pages through every search result; the first acceptable candidate in
/// oldest-first order wins.
pub fn find_bundle(
    network: &dyn ContentNetwork,
    identity: &RepoIdentity,
    index: u64,
    expected_prior_hash: &str,
    settings: &RepoSettings,
) -> Result<Option<BundleDescriptor>> {
    let name = identity.bundle_name(index);
    let query = SearchQuery::oldest_first(&name, settings.author_ids());

    let mut page_number = 1;
    loop {
        let page = network.search(&query.with_page(page_number))?;
        for item in &page.items {
            match check_candidate(item, expected_prior_hash, settings) {
                Ok((signer, timestamp)) => {
                    return Ok(Some(BundleDescriptor {
                        sequence_index: index,
                        name,
                        expected_prior_hash: expected_prior_hash.to_string(),
                        claim_id: item.claim_id.clone(),
                        permanent_url: item.permanent_url.clone(),
                        signer_channel_id: signer,
                        publish_timestamp: timestamp,
                    }));
                }
                Err(reason) => {
                    debug!(name = %name, claim_id = %item.claim_id, ?reason, "skipping candidate");
                }
            }
        }
        if page.items.is_empty() || page_number >= page.total_pages {
            return Ok(None);
        }
        page_number += 1;
    }
}

/// Follow the chain from `state.download_index`, downloading each accepted
/// bundle into the `in/` directory and persisting `state` after every
/// step. Returns how many bundles were downloaded.
pub fn discover_and_download(
    network: &dyn ContentNetwork,
    identity: &RepoIdentity,
    layout: &RepoLayout,
    settings: &RepoSettings,
    state: &mut SyncState,
) -> Result<u64> {
    if settings.authors.is_empty() {
        debug!("no authors listed, nothing can extend the chain");
        return Ok(0);
    }

    let mut downloaded = 0;
    while let Some(bundle) = find_bundle(
        network,
        identity,
        state.download_index,
        &state.download_prior_hash,
        settings,
    )? {
        let path = layout.in_bundle_path(bundle.sequence_index);
        info!(name = %bundle.name, url = %bundle.permanent_url, "downloading bundle");
        network.fetch_content(&bundle.permanent_url, &path)?;

        let next = SyncState {
            download_index: state.download_index + 1,
            download_prior_hash: file_sha1_hex(&path)?,
            applied_index: state.applied_index,
        };
        next.save(&layout.sync_path())?;
        *state = next;
        downloaded += 1;
    }
    debug!(download_index = state.download_index, "end of chain");
    Ok(downloaded)
}

/// Unbundle every downloaded but unapplied bundle into the mirror, in
/// order, persisting progress after each one. Stops at the first failure.
pub fn apply_downloaded(
    git: &dyn GitToolchain,
    layout: &RepoLayout,
    state: &mut SyncState,
) -> Result<u64> {
    let mirror = layout.mirror_path();
    let mut applied = 0;
    while state.applied_index < state.download_index {
        let index = state.applied_index;
        git.unbundle(&mirror, &layout.in_bundle_path(index))?;

        let next = SyncState {
            applied_index: index + 1,
            ..state.clone()
        };
        next.save(&layout.sync_path())?;
        *state = next;
        applied += 1;
        debug!(index, "applied bundle");
    }
    Ok(applied)
}

/// Lowercase hex SHA-1 of `bytes`.
pub fn sha1_hex(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

/// Lowercase hex SHA-1 of a file's bytes.
pub fn file_sha1_hex(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| GlbryError::read(path, e))?;
    let mut hasher = Sha1::new();
    io::copy(&mut file, &mut hasher).map_err(|e| GlbryError::read(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Create the `in/` and `out/` directories.
pub(crate) fn ensure_bundle_dirs(layout: &RepoLayout) -> Result<()> {
    for dir in [layout.in_dir(), layout.out_dir()] {
        fs::create_dir_all(&dir).map_err(|e| GlbryError::write(&dir, e))?;
    }
    Ok(())
}
