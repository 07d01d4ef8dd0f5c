//! User configuration (`~/.config/gitlbry/config.toml`).
//!
//! ```toml
//! daemon_url = "http://localhost:5279"
//! bid = "0.001"
//! verbose = false
//!
//! [push_as]
//! claim_id = "e66aa0b4..."
//! name = "@gitlbry"
//!
//! [repos."lbry://@gitlbry/gitlbry".push_as]
//! claim_id = "0b5d..."
//! name = "@other"
//! ```

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default lbrynet JSON-RPC endpoint.
pub const DEFAULT_DAEMON_URL: &str = "http://localhost:5279";

/// Default deposit for every published claim, in LBC.
pub const DEFAULT_BID: &str = "0.001";

/// A channel the user can publish with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub claim_id: String,
    /// Channel name including the leading `@`.
    pub name: String,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.claim_id)
    }
}

/// Per-repository overrides, keyed by normalized address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_as: Option<Channel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// lbrynet JSON-RPC endpoint
    pub daemon_url: String,

    /// Deposit attached to published bundles and settings
    pub bid: String,

    /// Echo the remote-helper protocol and debug logs to stderr
    pub verbose: bool,

    /// Where per-repository state lives (defaults to `$GIT_DIR/lbry`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Default publishing channel, set by `gitlbry me`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_as: Option<Channel>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub repos: BTreeMap<String, RepoConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_url: DEFAULT_DAEMON_URL.to_string(),
            bid: DEFAULT_BID.to_string(),
            verbose: false,
            data_dir: None,
            push_as: None,
            repos: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Get the config file path (`$GITLBRY_CONFIG`, else
    /// `~/.config/gitlbry/config.toml`)
    pub fn config_path() -> Option<PathBuf> {
        if let Some(path) = env::var_os("GITLBRY_CONFIG").filter(|p| !p.is_empty()) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("gitlbry").join("config.toml"))
    }

    /// Load config from the default path with environment overrides applied.
    pub fn load() -> Result<Self, ConfigError> {
        let config = match Self::config_path() {
            Some(path) => Self::load_from(&path)?,
            None => Config::default(),
        };
        Ok(config.with_env_overrides(|key| env::var(key).ok()))
    }

    /// Load config from `path`, or return default if the file doesn't exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    /// Save config to `path`, creating its directory if needed
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `GLBRY_DAEMON_URL` and `GLBRY_VERBOSE` from `lookup`.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("GLBRY_DAEMON_URL").filter(|u| !u.is_empty()) {
            self.daemon_url = url;
        }
        if let Some(verbose) = lookup("GLBRY_VERBOSE") {
            self.verbose = matches!(verbose.trim(), "1" | "true" | "yes" | "on");
        }
        self
    }

    /// The channel to publish `address` with: the repository override if
    /// present, otherwise the default.
    pub fn push_as_for(&self, address: &str) -> Option<&Channel> {
        self.repos
            .get(address)
            .and_then(|repo| repo.push_as.as_ref())
            .or(self.push_as.as_ref())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("could not determine config directory")]
    NoConfigDir,
}
