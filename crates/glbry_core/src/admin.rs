//! Repository administration behind the `gitlbry` binary.
//!
//! A repository is created by publishing its settings document at the
//! repository address; authors are managed by downloading that document,
//! appending grant/revoke boundaries, and republishing it over the same
//! claim.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use tracing::{debug, info};

use crate::config::{Channel, Config};
use crate::error::{GlbryError, Result};
use crate::lbry::{Claim, ContentNetwork, PublishRequest, UpdateRequest};
use crate::settings::RepoSettings;
use crate::url::{AddressKind, LbryUrl, channel_with_scheme};

const SETTINGS_FILE: &str = "settings.json";

/// Printed by `gitlbry me` when no channel is configured.
pub const NO_CURRENT_AUTHOR: &str = "<current author not set>";

/// One line of `gitlbry author <url>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorStatus {
    pub channel: Channel,
    pub granted: bool,
}

impl fmt::Display for AuthorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.granted { "granted" } else { "revoked" };
        write!(f, "{} {status}", self.channel)
    }
}

/// A `[^]<channel>` argument of `gitlbry author`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorChange {
    Grant(String),
    Revoke(String),
}

impl AuthorChange {
    pub fn channel(&self) -> &str {
        match self {
            AuthorChange::Grant(channel) | AuthorChange::Revoke(channel) => channel,
        }
    }
}

impl FromStr for AuthorChange {
    type Err = GlbryError;

    fn from_str(raw: &str) -> Result<Self> {
        let (change, channel): (fn(String) -> Self, &str) = match raw.strip_prefix('^') {
            Some(rest) => (AuthorChange::Revoke, rest),
            None => (AuthorChange::Grant, raw),
        };
        if channel.is_empty() {
            return Err(GlbryError::InvalidAddress(raw.to_string()));
        }
        Ok(change(channel.to_string()))
    }
}

/// Parse a repository address given on the command line.
fn repo_url(raw: &str) -> Result<LbryUrl> {
    let url = LbryUrl::parse_lenient(raw)?;
    if !url.is_content() {
        return Err(GlbryError::NotAContentAddress(url.to_string()));
    }
    Ok(url)
}

/// Resolve `raw` (`name`, `@name` or a full channel address) to a channel.
pub fn resolve_channel(network: &dyn ContentNetwork, raw: &str) -> Result<(Channel, Claim)> {
    let url = LbryUrl::parse(&channel_with_scheme(raw))?;
    if url.kind() != AddressKind::Channel {
        return Err(GlbryError::NotAChannelAddress(url.to_string()));
    }
    let claim = network.resolve(url.as_str())?;
    let channel = Channel {
        claim_id: claim.claim_id.clone(),
        name: claim.display_name().to_string(),
    };
    Ok((channel, claim))
}

/// Whether `url` already resolves. A per-item resolve error (code 0) means
/// the name is free. Daemon error envelopes and transport failures are
/// propagated.
fn exists(network: &dyn ContentNetwork, url: &LbryUrl) -> Result<bool> {
    match network.resolve(url.as_str()) {
        Ok(_) => Ok(true),
        Err(GlbryError::Rpc { code: 0, message }) => {
            debug!(url = %url, %message, "address is free");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

fn write_settings(dir: &Path, settings: &RepoSettings) -> Result<std::path::PathBuf> {
    let path = dir.join(SETTINGS_FILE);
    fs::write(&path, settings.to_json()?).map_err(|e| GlbryError::write(&path, e))?;
    Ok(path)
}

/// Download and parse the settings document published at `url`.
pub fn download_settings(network: &dyn ContentNetwork, url: &LbryUrl) -> Result<RepoSettings> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join(SETTINGS_FILE);
    network.fetch_content(url.as_str(), &path)?;
    RepoSettings::load(&path)
}

/// `gitlbry init <url>`: publish a fresh settings document naming the
/// configured channel as the only author.
pub fn init(
    network: &dyn ContentNetwork,
    config: &Config,
    raw_url: &str,
    now: i64,
) -> Result<RepoSettings> {
    let url = repo_url(raw_url)?;
    let name = url
        .content_name()
        .ok_or_else(|| GlbryError::NotAContentAddress(url.to_string()))?
        .to_string();

    let channel_id = match url.channel_url() {
        Some(channel_url) => {
            let (channel, claim) = resolve_channel(network, &channel_url)?;
            if !claim.is_mine() {
                return Err(GlbryError::NotAuthorized(format!(
                    "channel {channel} is not controlled by this wallet"
                )));
            }
            Some(channel.claim_id)
        }
        None => None,
    };

    if exists(network, &url)? {
        return Err(GlbryError::RepoExists(url.to_string()));
    }

    let author = config
        .push_as_for(url.as_str())
        .ok_or(GlbryError::NoPublishingChannelConfigured)?;
    let settings = RepoSettings::new_with_author(&author.claim_id, &author.name, now);

    let dir = tempfile::tempdir()?;
    let file_path = write_settings(dir.path(), &settings)?;
    network.publish(&PublishRequest {
        name,
        bid: config.bid.clone(),
        file_path,
        channel_id,
        description: None,
        blocking: true,
    })?;
    info!(url = %url, author = %author, "repository created");
    Ok(settings)
}

/// `gitlbry me`: the configured default channel.
pub fn show_me(config: &Config) -> String {
    match &config.push_as {
        Some(channel) => channel.to_string(),
        None => NO_CURRENT_AUTHOR.to_string(),
    }
}

/// `gitlbry me <channel>`: make `raw` the default publishing channel.
///
/// The caller saves `config` afterwards.
pub fn set_me(network: &dyn ContentNetwork, config: &mut Config, raw: &str) -> Result<Channel> {
    let (channel, claim) = resolve_channel(network, raw)?;
    if !claim.is_mine() {
        return Err(GlbryError::NotAuthorized(format!(
            "channel {channel} is not controlled by this wallet"
        )));
    }
    config.push_as = Some(channel.clone());
    Ok(channel)
}

/// `gitlbry author <url>`: every author and whether it is granted now.
pub fn list_authors(network: &dyn ContentNetwork, raw_url: &str) -> Result<Vec<AuthorStatus>> {
    let url = repo_url(raw_url)?;
    let settings = download_settings(network, &url)?;
    Ok(settings
        .authors
        .iter()
        .map(|author| AuthorStatus {
            channel: Channel {
                claim_id: author.channel_id.clone(),
                name: author.channel_name.clone(),
            },
            granted: author.is_currently_granted(),
        })
        .collect())
}

/// `gitlbry author <url> [^]<channel>...`: grant or revoke each channel at
/// `now` and republish the settings over the repository claim.
///
/// Every channel is resolved before anything is published, so a bad
/// argument leaves the repository untouched.
pub fn modify_authors(
    network: &dyn ContentNetwork,
    raw_url: &str,
    changes: &[AuthorChange],
    now: i64,
) -> Result<RepoSettings> {
    let url = repo_url(raw_url)?;
    let repo = network.resolve(url.as_str())?;
    if !repo.is_mine() {
        return Err(GlbryError::NotAuthorized(format!(
            "repository {url} is not controlled by this wallet"
        )));
    }

    let resolved = changes
        .iter()
        .map(|change| resolve_channel(network, change.channel()).map(|(c, _)| (change, c)))
        .collect::<Result<Vec<_>>>()?;

    let mut settings = download_settings(network, &url)?;
    let mut changed = false;
    for (change, channel) in &resolved {
        let applied = match change {
            AuthorChange::Grant(_) => settings.grant(&channel.claim_id, &channel.name, now),
            AuthorChange::Revoke(_) => settings.revoke(&channel.claim_id, now),
        };
        debug!(channel = %channel, ?change, applied, "author change");
        changed |= applied;
    }

    if !changed {
        info!(url = %url, "authors unchanged");
        return Ok(settings);
    }

    let dir = tempfile::tempdir()?;
    let file_path = write_settings(dir.path(), &settings)?;
    network.update(&UpdateRequest {
        claim_id: repo.claim_id.clone(),
        file_path,
        blocking: true,
    })?;
    info!(url = %url, "authors updated");
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryNetwork;

    const REPO: &str = "lbry://@alice/repo";

    fn claim(claim_id: &str, name: &str, mine: bool) -> Claim {
        Claim {
            claim_id: claim_id.into(),
            name: Some(name.into()),
            normalized_name: Some(name.into()),
            is_my_output: Some(mine),
            ..Claim::default()
        }
    }

    fn alice() -> Channel {
        Channel {
            claim_id: "A1".into(),
            name: "@alice".into(),
        }
    }

    fn network() -> InMemoryNetwork {
        let network = InMemoryNetwork::new();
        network.add_resolvable("lbry://@alice", claim("A1", "@alice", true));
        network.add_resolvable("lbry://@bob", claim("B2", "@bob", false));
        network
    }

    fn with_repo(network: &InMemoryNetwork, mine: bool) {
        network.add_resolvable(REPO, claim("R1", "repo", mine));
        network.set_content(
            REPO,
            RepoSettings::new_with_author("A1", "@alice", 1000)
                .to_json()
                .unwrap()
                .into_bytes(),
        );
    }

    fn config() -> Config {
        Config {
            push_as: Some(alice()),
            ..Config::default()
        }
    }

    #[test]
    fn test_parse_author_change() {
        assert_eq!(
            "@bob".parse::<AuthorChange>().unwrap(),
            AuthorChange::Grant("@bob".into())
        );
        assert_eq!(
            "^bob".parse::<AuthorChange>().unwrap(),
            AuthorChange::Revoke("bob".into())
        );
        assert!("^".parse::<AuthorChange>().is_err());
    }

    #[test]
    fn test_init_publishes_settings_on_channel() {
        let network = network();
        let settings = init(&network, &config(), "@alice/repo", 1234).unwrap();
        assert_eq!(settings.authors.len(), 1);
        assert_eq!(settings.authors[0].windows, vec![1234]);

        let published = network.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].name, "repo");
        assert_eq!(published[0].channel_id.as_deref(), Some("A1"));
        assert_eq!(published[0].description, None);

        let body = network.content("lbry://repo#claim1").unwrap();
        let stored = RepoSettings::from_json(std::str::from_utf8(&body).unwrap()).unwrap();
        assert_eq!(stored, settings);
    }

    #[test]
    fn test_init_without_channel_publishes_bare_name() {
        let network = network();
        init(&network, &config(), "lbry://repo", 1).unwrap();
        assert_eq!(network.published()[0].channel_id, None);
    }

    #[test]
    fn test_init_refuses_existing_repo() {
        let network = network();
        with_repo(&network, true);
        let err = init(&network, &config(), REPO, 1).unwrap_err();
        assert!(matches!(err, GlbryError::RepoExists(_)));
        assert!(network.published().is_empty());
    }

    #[test]
    fn test_init_stops_when_daemon_cannot_resolve() {
        let network = network();
        network.fail_resolve(REPO);
        let err = init(&network, &config(), REPO, 1).unwrap_err();
        assert!(matches!(err, GlbryError::Rpc { code: -32500, .. }));
        assert!(network.published().is_empty());
    }

    #[test]
    fn test_init_requires_push_as() {
        let err = init(&network(), &Config::default(), REPO, 1).unwrap_err();
        assert!(matches!(err, GlbryError::NoPublishingChannelConfigured));
    }

    #[test]
    fn test_init_on_foreign_channel_is_refused() {
        let err = init(&network(), &config(), "lbry://@bob/repo", 1).unwrap_err();
        assert!(matches!(err, GlbryError::NotAuthorized(_)));
    }

    #[test]
    fn test_init_rejects_channel_address() {
        let err = init(&network(), &config(), "lbry://@alice", 1).unwrap_err();
        assert!(matches!(err, GlbryError::NotAContentAddress(_)));
    }

    #[test]
    fn test_me_flow() {
        let network = network();
        let mut config = Config::default();
        assert_eq!(show_me(&config), NO_CURRENT_AUTHOR);

        let channel = set_me(&network, &mut config, "alice").unwrap();
        assert_eq!(channel, alice());
        assert_eq!(show_me(&config), "@alice:A1");

        let err = set_me(&network, &mut config, "@bob").unwrap_err();
        assert!(matches!(err, GlbryError::NotAuthorized(_)));
        assert_eq!(config.push_as, Some(alice()));

        let err = set_me(&network, &mut config, "lbry://@alice/repo").unwrap_err();
        assert!(matches!(err, GlbryError::NotAChannelAddress(_)));
    }

    #[test]
    fn test_list_authors() {
        let network = network();
        with_repo(&network, true);
        let authors = list_authors(&network, REPO).unwrap();
        assert_eq!(authors.len(), 1);
        assert_eq!(authors[0].to_string(), "@alice:A1 granted");
    }

    #[test]
    fn test_grant_and_revoke_republish() {
        let network = network();
        with_repo(&network, true);

        let settings =
            modify_authors(&network, REPO, &["@bob".parse().unwrap()], 2000).unwrap();
        assert!(settings.is_authorized("B2", 2000));
        let updates = network.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].claim_id, "R1");

        let settings =
            modify_authors(&network, REPO, &["^alice".parse().unwrap()], 3000).unwrap();
        assert!(!settings.is_authorized("A1", 3000));
        assert!(settings.is_authorized("A1", 2999));
        assert_eq!(network.updates().len(), 2);

        let listed = list_authors(&network, REPO).unwrap();
        let lines: Vec<String> = listed.iter().map(ToString::to_string).collect();
        assert_eq!(lines, vec!["@alice:A1 revoked", "@bob:B2 granted"]);
    }

    #[test]
    fn test_noop_change_does_not_republish() {
        let network = network();
        with_repo(&network, true);
        modify_authors(&network, REPO, &["@alice".parse().unwrap()], 2000).unwrap();
        assert!(network.updates().is_empty());
    }

    #[test]
    fn test_modify_requires_owning_repo() {
        let network = network();
        with_repo(&network, false);
        let err = modify_authors(&network, REPO, &["@bob".parse().unwrap()], 2000).unwrap_err();
        assert!(matches!(err, GlbryError::NotAuthorized(_)));
        assert!(network.updates().is_empty());
    }

    #[test]
    fn test_unknown_channel_leaves_repo_untouched() {
        let network = network();
        with_repo(&network, true);
        let changes = ["@bob".parse().unwrap(), "@carol".parse().unwrap()];
        let err = modify_authors(&network, REPO, &changes, 2000).unwrap_err();
        assert!(matches!(err, GlbryError::Rpc { .. }));
        assert!(network.updates().is_empty());
    }
}
