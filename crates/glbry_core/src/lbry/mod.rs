//! The content network: resolve, search, publish and download claims.
//!
//! [`ContentNetwork`] is the seam between gitlbry's sync logic and the
//! lbrynet daemon; [`LbrynetClient`] is the JSON-RPC implementation.

mod rpc;
pub mod types;

use std::path::Path;

use crate::error::Result;

pub use rpc::LbrynetClient;
pub use types::{Claim, PublishRequest, SearchItem, SearchPage, SearchQuery, UpdateRequest};

/// Operations gitlbry needs from the content network.
pub trait ContentNetwork {
    /// Resolve one address. A per-item error (e.g. not found) is returned
    /// as [`GlbryError::Rpc`](crate::error::GlbryError::Rpc) with code 0.
    fn resolve(&self, url: &str) -> Result<Claim>;

    /// One page of claim search results.
    fn search(&self, query: &SearchQuery) -> Result<SearchPage>;

    /// Publish a new stream claim.
    fn publish(&self, request: &PublishRequest) -> Result<()>;

    /// Replace the content of an existing stream claim.
    fn update(&self, request: &UpdateRequest) -> Result<()>;

    /// Download the content at `uri` to `dest`.
    fn fetch_content(&self, uri: &str, dest: &Path) -> Result<()>;
}
