//! Diagnostic logging setup shared by both binaries.
//!
//! stdout belongs to the remote-helper protocol, so every log line goes to
//! stderr.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding an `EnvFilter` directive.
pub const LOG_ENV: &str = "GLBRY_LOG";

/// Install the global subscriber. `GLBRY_LOG` wins when set; otherwise the
/// level is `warn`, or `debug` for gitlbry crates when `verbose`.
///
/// Calling this more than once is harmless.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| default_filter(verbose));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

fn default_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("warn,glbry_core=debug,glbry=debug")
    } else {
        EnvFilter::new("warn")
    }
}
