//! `init`, `me` and `author` command handlers.

use glbry_core::admin::{self, AuthorChange};
use glbry_core::config::Config;
use glbry_core::lbry::ContentNetwork;

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Handle the `gitlbry init` command.
pub fn handle_init(network: &dyn ContentNetwork, config: &Config, url: &str) -> bool {
    match admin::init(network, config, url, now()) {
        Ok(_) => {
            println!("created");
            true
        }
        Err(e) => {
            eprintln!("error: {e}");
            false
        }
    }
}

/// Handle `gitlbry me` with no argument.
pub fn handle_show_me(config: &Config) -> bool {
    println!("{}", admin::show_me(config));
    true
}

/// Handle `gitlbry me <channel>`.
pub fn handle_set_me(network: &dyn ContentNetwork, config: &mut Config, channel: &str) -> bool {
    let channel = match admin::set_me(network, config, channel) {
        Ok(channel) => channel,
        Err(e) => {
            eprintln!("error: {e}");
            return false;
        }
    };
    if let Err(e) = config.save() {
        eprintln!("error: failed to save config: {e}");
        return false;
    }
    tracing::debug!(%channel, "default channel saved");
    println!("ok");
    true
}

/// Handle `gitlbry author <url>`.
pub fn handle_author_list(network: &dyn ContentNetwork, url: &str) -> bool {
    match admin::list_authors(network, url) {
        Ok(authors) => {
            for author in authors {
                println!("{author}");
            }
            true
        }
        Err(e) => {
            eprintln!("error: {e}");
            false
        }
    }
}

/// Handle `gitlbry author <url> [^]<channel>...`.
pub fn handle_author_modify(network: &dyn ContentNetwork, url: &str, channels: &[String]) -> bool {
    let changes = match channels
        .iter()
        .map(|c| c.parse::<AuthorChange>())
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(changes) => changes,
        Err(e) => {
            eprintln!("error: {e}");
            return false;
        }
    };

    match admin::modify_authors(network, url, &changes, now()) {
        Ok(_) => {
            println!("ok");
            true
        }
        Err(e) => {
            eprintln!("error: {e}");
            false
        }
    }
}
