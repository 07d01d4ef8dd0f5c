//! The remote-helper session and its startup sequence.
//!
//! Opening a [`Remote`] brings the local mirror up to date with the
//! network before git issues any command:
//!
//! 1. derive the repository identity from the address
//! 2. take the exclusive per-repository lock
//! 3. create the local directories and the bare mirror on first use
//! 4. load the sync state
//! 5. download the repository settings
//! 6. discover and download new bundles
//! 7. apply downloaded bundles to the mirror
//! 8. read the mirror's refs and HEAD
//!
//! Any failure aborts startup.

use std::fs;

use tracing::{debug, info};

use crate::chain::{apply_downloaded, discover_and_download, ensure_bundle_dirs};
use crate::config::{Channel, Config};
use crate::error::{GlbryError, Result};
use crate::git::{GitToolchain, NamedRef};
use crate::identity::{RepoIdentity, RepoLayout, local_root};
use crate::lbry::ContentNetwork;
use crate::lock::RepoLock;
use crate::settings::RepoSettings;
use crate::sync_state::SyncState;

/// How this session publishes bundles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOptions {
    pub push_as: Option<Channel>,
    pub bid: String,
}

impl PublishOptions {
    pub fn from_config(config: &Config, identity: &RepoIdentity) -> Self {
        Self {
            push_as: config.push_as_for(identity.address().as_str()).cloned(),
            bid: config.bid.clone(),
        }
    }
}

/// An open remote: the lock is held and the mirror is current.
pub struct Remote<N: ContentNetwork, G: GitToolchain> {
    pub(crate) identity: RepoIdentity,
    pub(crate) layout: RepoLayout,
    pub(crate) settings: RepoSettings,
    pub(crate) state: SyncState,
    pub(crate) refs: Vec<NamedRef>,
    pub(crate) head: String,
    /// Chain slot the next push publishes into.
    pub(crate) next_slot: u64,
    /// Description the next pushed bundle must carry.
    pub(crate) prior_hash: String,
    pub(crate) publish: PublishOptions,
    pub(crate) network: N,
    pub(crate) git: G,
    _lock: RepoLock,
}

impl<N: ContentNetwork, G: GitToolchain> Remote<N, G> {
    /// Run the startup sequence for `address`.
    pub fn open(address: &str, config: &Config, network: N, git: G) -> Result<Self> {
        let identity = RepoIdentity::from_address(address)?;
        let root = local_root(config.data_dir.as_deref());
        let layout = RepoLayout::new(&root, &identity)?;
        let publish = PublishOptions::from_config(config, &identity);
        info!(address = %identity.address(), root = %layout.root().display(), "opening remote");

        fs::create_dir_all(layout.root()).map_err(|e| GlbryError::write(layout.root(), e))?;
        let lock = RepoLock::acquire(&layout.lock_path())?;

        ensure_bundle_dirs(&layout)?;
        let mirror = layout.mirror_path();
        if !mirror.join("HEAD").exists() {
            debug!(mirror = %mirror.display(), "creating mirror");
            git.init_bare(&mirror)?;
        }

        let mut state = SyncState::load(&layout.sync_path());
        debug!(?state, "loaded sync state");

        let settings_path = layout.settings_path();
        network.fetch_content(identity.address().as_str(), &settings_path)?;
        let settings = RepoSettings::load(&settings_path)?;
        debug!(authors = settings.authors.len(), "loaded settings");

        let downloaded =
            discover_and_download(&network, &identity, &layout, &settings, &mut state)?;
        let applied = apply_downloaded(&git, &layout, &mut state)?;
        info!(downloaded, applied, index = state.download_index, "remote synced");

        let refs = git.show_refs(&mirror)?;
        let head = git.read_head(&mirror)?;

        Ok(Self {
            next_slot: state.download_index,
            prior_hash: state.download_prior_hash.clone(),
            identity,
            layout,
            settings,
            state,
            refs,
            head,
            publish,
            network,
            git,
            _lock: lock,
        })
    }

    pub fn identity(&self) -> &RepoIdentity {
        &self.identity
    }

    pub fn layout(&self) -> &RepoLayout {
        &self.layout
    }

    pub fn settings(&self) -> &RepoSettings {
        &self.settings
    }

    pub fn sync_state(&self) -> &SyncState {
        &self.state
    }

    /// Refs of the mirror as of startup or the last push.
    pub fn refs(&self) -> &[NamedRef] {
        &self.refs
    }

    /// `@<ref>` or a hex id.
    pub fn head(&self) -> &str {
        &self.head
    }

    pub fn next_slot(&self) -> u64 {
        self.next_slot
    }

    pub fn prior_hash(&self) -> &str {
        &self.prior_hash
    }

    pub fn git(&self) -> &G {
        &self.git
    }

    pub(crate) fn reload_refs(&mut self) -> Result<()> {
        let mirror = self.layout.mirror_path();
        self.refs = self.git.show_refs(&mirror)?;
        self.head = self.git.read_head(&mirror)?;
        Ok(())
    }
}
