//! Command-line surface of `gitlbry`.

use std::process;

use clap::{Parser, Subcommand};
use glbry_core::config::Config;
use glbry_core::lbry::LbrynetClient;
use glbry_core::logging;

mod admin;

#[derive(Parser, Debug)]
#[command(
    name = "gitlbry",
    version,
    about = "Manage git repositories stored on the LBRY network",
    after_help = "Repositories are used through git itself:\n  git clone lbry://@channel/repo\n  git push"
)]
pub struct Cli {
    /// lbrynet JSON-RPC endpoint (overrides the config file)
    #[arg(long, global = true, env = "GLBRY_DAEMON_URL", value_name = "URL")]
    pub daemon_url: Option<String>,

    /// Debug logging to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new repository at a url such as lbry://@channel/repo
    Init {
        /// Repository url
        url: String,
    },

    /// Show or set the channel used to publish
    Me {
        /// Channel to publish as, e.g. @mychannel
        channel: Option<String>,
    },

    /// List a repository's authors, or grant/revoke push access
    Author {
        /// Repository url
        url: String,

        /// Channels to grant; prefix with ^ to revoke (e.g. ^@mallory)
        #[arg(allow_hyphen_values = true)]
        channels: Vec<String>,
    },
}

/// Parse arguments, run the command and exit with its status.
pub fn run_cli() {
    let cli = Cli::parse();

    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };
    if let Some(url) = cli.daemon_url {
        config.daemon_url = url;
    }
    logging::init(cli.verbose || config.verbose);

    let network = LbrynetClient::new(config.daemon_url.clone());
    let ok = match cli.command {
        Commands::Init { url } => admin::handle_init(&network, &config, &url),
        Commands::Me { channel: None } => admin::handle_show_me(&config),
        Commands::Me {
            channel: Some(channel),
        } => admin::handle_set_me(&network, &mut config, &channel),
        Commands::Author { url, channels } if channels.is_empty() => {
            admin::handle_author_list(&network, &url)
        }
        Commands::Author { url, channels } => {
            admin::handle_author_modify(&network, &url, &channels)
        }
    };

    if !ok {
        process::exit(1);
    }
}
