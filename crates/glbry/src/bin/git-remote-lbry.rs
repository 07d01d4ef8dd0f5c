//! git remote helper for `lbry://` remotes.
//!
//! git runs this as `git-remote-lbry <remote-name> <url>` and talks to it
//! over stdin/stdout; see `gitremote-helpers(7)`.

use std::io;
use std::process;

use clap::Parser;
use glbry_core::config::Config;
use glbry_core::git::GitCli;
use glbry_core::lbry::LbrynetClient;
use glbry_core::logging;
use glbry_core::protocol::{Dispatcher, Transcript};
use glbry_core::startup::Remote;

#[derive(Parser, Debug)]
#[command(name = "git-remote-lbry", version, about = "git remote helper for lbry:// urls")]
struct Args {
    /// Name of the remote (or the url itself when git has no name for it)
    remote: String,

    /// Repository url, e.g. lbry://@channel/repo
    url: Option<String>,
}

fn run(args: Args) -> glbry_core::Result<()> {
    let config = Config::load()?;
    logging::init(config.verbose);

    let address = args.url.unwrap_or(args.remote);
    tracing::debug!(%address, "remote helper started");

    let network = LbrynetClient::new(config.daemon_url.clone());
    let mut remote = Remote::open(&address, &config, network, GitCli::new())?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let transcript = if config.verbose {
        Transcript::stderr()
    } else {
        Transcript::disabled()
    };
    Dispatcher::new(&mut remote, stdin.lock(), stdout.lock())
        .with_transcript(transcript)
        .run()
}

fn main() {
    if let Err(e) = run(Args::parse()) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
