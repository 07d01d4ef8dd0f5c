//! # `glbry_core`
//!
//! Core library for gitlbry: git repositories stored on the LBRY content
//! network as an append-only chain of bundles.
//!
//! There are two front ends:
//! 1. The remote helper (`git-remote-lbry`), which git runs for `lbry://` remotes
//! 2. The administration tool (`gitlbry`)
//!
//! Each pushed bundle is published as `<repo>-<n>` and carries the SHA-1 of
//! bundle `n - 1` in its description, so readers can walk the chain with
//! nothing but claim search. Who may publish, and when, is recorded in the
//! repository's settings document (see [`settings`]).

/// Repository administration (`gitlbry init`, `me`, `author`)
pub mod admin;

/// Bundle chain discovery, download and apply
pub mod chain;

pub mod config;

/// Error docs
pub mod error;

/// Git toolchain seam and the `git` CLI adapter
pub mod git;

pub mod identity;

/// Content network seam and the lbrynet JSON-RPC client
pub mod lbry;

pub mod lock;
pub mod logging;
pub mod memory;
pub mod protocol;
pub mod push;
pub mod settings;
pub mod startup;
pub mod sync_state;

/// `lbry://` address grammar
pub mod url;

pub use error::{GlbryError, Result};
