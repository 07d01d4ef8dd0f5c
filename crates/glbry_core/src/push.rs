//! Publishing pushed refs as the next bundle in the chain.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use tracing::{info, warn};

use crate::chain::file_sha1_hex;
use crate::error::{GlbryError, Result};
use crate::git::{GitToolchain, NamedRef, ObjectId};
use crate::lbry::{ContentNetwork, PublishRequest};
use crate::startup::Remote;

/// One `push [+]<src>:<dst>` line from git.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushSpec {
    pub force: bool,
    pub src: String,
    pub dst: String,
}

impl PushSpec {
    /// The refspec as git wrote it, handed unchanged to the local push.
    pub fn refspec(&self) -> String {
        let force = if self.force { "+" } else { "" };
        format!("{force}{}:{}", self.src, self.dst)
    }
}

impl fmt::Display for PushSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.refspec())
    }
}

impl FromStr for PushSpec {
    type Err = GlbryError;

    /// Parse the argument of a push command, e.g. `+refs/heads/a:refs/heads/b`.
    /// An empty `src` is a deletion request.
    fn from_str(raw: &str) -> Result<Self> {
        let (force, rest) = match raw.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        match rest.split_once(':') {
            Some((src, dst)) if !dst.is_empty() && !dst.contains(':') => Ok(Self {
                force,
                src: src.to_string(),
                dst: dst.to_string(),
            }),
            _ => Err(GlbryError::Protocol(format!("malformed push refspec: {raw:?}"))),
        }
    }
}

/// Outcome of a push batch as reported back to git.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Published { name: String },
    /// The batch only deleted refs; the mirror changed but nothing was
    /// published.
    Unchanged,
    Failed(String),
}

impl<N: ContentNetwork, G: GitToolchain> Remote<N, G> {
    /// Push `specs` into the mirror, bundle the new history and publish it
    /// into the next chain slot.
    ///
    /// Only a missing publishing channel is returned as an error. Every
    /// other failure is reported as [`PushOutcome::Failed`] so the whole
    /// batch can be answered with `error` lines; the mirror's refs are put
    /// back as they were before the batch.
    pub fn push_batch(&mut self, specs: &[PushSpec]) -> Result<PushOutcome> {
        let Some(channel) = self.publish.push_as.clone() else {
            return Err(GlbryError::NoPublishingChannelConfigured);
        };

        let mirror = self.layout.mirror_path();
        let before = match self.git.show_refs(&mirror) {
            Ok(refs) => refs,
            Err(e) => {
                warn!("push failed: {e}");
                return Ok(PushOutcome::Failed(e.to_string()));
            }
        };

        let outcome = match self.publish_bundle(&channel.claim_id, specs, &before) {
            Ok(Some(name)) => {
                info!(%name, refs = specs.len(), "push published");
                PushOutcome::Published { name }
            }
            Ok(None) => {
                info!(refs = specs.len(), "push deleted refs only, nothing to publish");
                PushOutcome::Unchanged
            }
            Err(e) => {
                warn!("push failed: {e}");
                self.restore_refs(specs, &before);
                PushOutcome::Failed(e.to_string())
            }
        };
        if let Err(e) = self.reload_refs() {
            warn!("could not reload mirror refs: {e}");
        }
        Ok(outcome)
    }

    fn publish_bundle(
        &mut self,
        channel_id: &str,
        specs: &[PushSpec],
        before: &[NamedRef],
    ) -> Result<Option<String>> {
        let mirror = self.layout.mirror_path();
        for spec in specs {
            self.git.push_local(&mirror, &spec.refspec())?;
        }

        // Deletions stay local: a bundle cannot carry them.
        let include: Vec<String> = specs
            .iter()
            .filter(|s| !s.src.is_empty())
            .map(|s| s.dst.clone())
            .collect();
        if include.is_empty() {
            return Ok(None);
        }

        let after = self.git.show_refs(&mirror)?;
        let tips: Vec<ObjectId> = after
            .iter()
            .filter(|r| include.contains(&r.name))
            .map(|r| r.id)
            .collect();
        let exclude = self.bundle_exclusions(&tips, before)?;

        let slot = self.next_slot;
        let out = self.layout.out_bundle_path(slot);
        self.git.create_bundle(&mirror, &out, &include, &exclude)?;

        let name = self.identity.bundle_name(slot);
        self.network.publish(&PublishRequest {
            name: name.clone(),
            bid: self.publish.bid.clone(),
            file_path: out.clone(),
            channel_id: Some(channel_id.to_string()),
            description: Some(self.prior_hash.clone()),
            blocking: true,
        })?;

        self.prior_hash = file_sha1_hex(&out)?;
        self.next_slot = slot + 1;
        Ok(Some(name))
    }

    /// Commits readers are assumed to have: the pre-push refs, except that
    /// a ref reaching one of `tips` is replaced by that tip's parents.
    /// Otherwise git would drop the tip from the bundle, e.g. for a new
    /// branch at an already published commit.
    fn bundle_exclusions(&self, tips: &[ObjectId], before: &[NamedRef]) -> Result<Vec<ObjectId>> {
        let mirror = self.layout.mirror_path();
        let mut pending: Vec<ObjectId> = before.iter().map(|r| r.id).collect();
        let mut seen = HashSet::new();
        let mut exclude = BTreeSet::new();
        while let Some(id) = pending.pop() {
            if !seen.insert(id) {
                continue;
            }
            let mut covered = Vec::new();
            for &tip in tips {
                if self.git.is_ancestor(&mirror, tip, id)? {
                    covered.push(tip);
                }
            }
            if covered.is_empty() {
                exclude.insert(id);
            }
            for tip in covered {
                pending.extend(self.git.parents(&mirror, tip)?);
            }
        }
        Ok(exclude.into_iter().collect())
    }

    /// Put every ref named by `specs` back to its value in `before`.
    fn restore_refs(&self, specs: &[PushSpec], before: &[NamedRef]) {
        let mirror = self.layout.mirror_path();
        for spec in specs {
            let id = before.iter().find(|r| r.name == spec.dst).map(|r| r.id);
            if let Err(e) = self.git.update_ref(&mirror, &spec.dst, id) {
                warn!(name = %spec.dst, "could not restore mirror ref: {e}");
            }
        }
    }
}
