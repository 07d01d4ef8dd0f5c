//! `gitlbry`: create repositories on LBRY and manage who may push to them.

/// CLI module - command-line interface for gitlbry
mod cli;

fn main() {
    cli::run_cli();
}
