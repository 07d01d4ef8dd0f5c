//! In-memory implementations of [`ContentNetwork`] and [`GitToolchain`].
//!
//! These keep all state behind `Arc<Mutex<..>>` so clones share it: two
//! remote sessions built on clones of one [`InMemoryNetwork`] see each
//! other's publishes, which is how the sync tests exercise a writer and a
//! reader against the same network.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::json;

use crate::error::{GlbryError, Result};
use crate::git::{GitToolchain, NamedRef, ObjectId};
use crate::lbry::types::{SigningChannel, StreamValue};
use crate::lbry::{
    Claim, ContentNetwork, PublishRequest, SearchItem, SearchPage, SearchQuery, UpdateRequest,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A `claim_search` result for a bundle signed by `signer`.
pub fn search_item(claim_id: &str, signer: &str, timestamp: i64, description: &str) -> SearchItem {
    SearchItem {
        claim_id: claim_id.to_string(),
        permanent_url: format!("lbry://{claim_id}"),
        timestamp: Some(timestamp),
        signing_channel: Some(SigningChannel {
            claim_id: signer.to_string(),
            name: None,
        }),
        value: Some(StreamValue {
            description: Some(description.to_string()),
        }),
        error: None,
    }
}

#[derive(Default)]
struct NetworkState {
    /// Searchable claims by name, in publish order.
    claims: Vec<(String, SearchItem)>,
    resolvable: HashMap<String, Claim>,
    contents: HashMap<String, Vec<u8>>,
    page_size: Option<u64>,
    now: i64,
    next_id: u64,
    searches: usize,
    fail_searches: bool,
    fail_publishes: bool,
    failing_resolves: HashSet<String>,
    published: Vec<PublishRequest>,
    updates: Vec<UpdateRequest>,
}

/// A content network held entirely in memory.
#[derive(Clone, Default)]
pub struct InMemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl InMemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve search results `page_size` at a time, whatever the query asks.
    pub fn with_page_size(page_size: u64) -> Self {
        let network = Self::new();
        lock(&network.state).page_size = Some(page_size);
        network
    }

    /// Timestamp given to claims published from now on.
    pub fn set_time(&self, now: i64) {
        lock(&self.state).now = now;
    }

    /// Make `item` findable under `name`, with `content` at its permanent url.
    pub fn add_claim(&self, name: &str, item: SearchItem, content: Vec<u8>) {
        let mut state = lock(&self.state);
        state.contents.insert(item.permanent_url.clone(), content);
        state.claims.push((name.to_string(), item));
    }

    /// Make `url` resolve to `claim`.
    pub fn add_resolvable(&self, url: &str, claim: Claim) {
        lock(&self.state).resolvable.insert(url.to_string(), claim);
    }

    /// Serve `content` for `uri`.
    pub fn set_content(&self, uri: &str, content: Vec<u8>) {
        lock(&self.state).contents.insert(uri.to_string(), content);
    }

    pub fn content(&self, uri: &str) -> Option<Vec<u8>> {
        lock(&self.state).contents.get(uri).cloned()
    }

    pub fn searches(&self) -> usize {
        lock(&self.state).searches
    }

    pub fn fail_searches(&self) {
        lock(&self.state).fail_searches = true;
    }

    pub fn fail_publishes(&self) {
        lock(&self.state).fail_publishes = true;
    }

    /// Answer resolves of `url` with a daemon error envelope.
    pub fn fail_resolve(&self, url: &str) {
        lock(&self.state).failing_resolves.insert(url.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = lock(&self.state);
        state.fail_searches = false;
        state.fail_publishes = false;
        state.failing_resolves.clear();
    }

    pub fn published(&self) -> Vec<PublishRequest> {
        lock(&self.state).published.clone()
    }

    pub fn updates(&self) -> Vec<UpdateRequest> {
        lock(&self.state).updates.clone()
    }
}

impl ContentNetwork for InMemoryNetwork {
    fn resolve(&self, url: &str) -> Result<Claim> {
        let state = lock(&self.state);
        if state.failing_resolves.contains(url) {
            return Err(GlbryError::Rpc {
                code: -32500,
                message: "wallet is not ready".into(),
            });
        }
        state
            .resolvable
            .get(url)
            .cloned()
            .ok_or_else(|| GlbryError::Rpc {
                code: 0,
                message: format!("Could not find claim at \"{url}\"."),
            })
    }

    fn search(&self, query: &SearchQuery) -> Result<SearchPage> {
        let mut state = lock(&self.state);
        state.searches += 1;
        if state.fail_searches {
            return Err(GlbryError::Network("connection refused".into()));
        }
        let matching: Vec<SearchItem> = state
            .claims
            .iter()
            .filter(|(name, _)| *name == query.name)
            .filter(|(_, item)| {
                item.signing_channel
                    .as_ref()
                    .is_some_and(|c| query.channel_ids.contains(&c.claim_id))
            })
            .map(|(_, item)| item.clone())
            .collect();

        let page_size = state.page_size.unwrap_or(query.page_size).max(1);
        let total_items = matching.len() as u64;
        let total_pages = total_items.div_ceil(page_size);
        let skip = (query.page.saturating_sub(1) * page_size) as usize;
        Ok(SearchPage {
            items: matching
                .into_iter()
                .skip(skip)
                .take(page_size as usize)
                .collect(),
            page: query.page,
            page_size,
            total_items,
            total_pages,
        })
    }

    fn publish(&self, request: &PublishRequest) -> Result<()> {
        let content =
            fs::read(&request.file_path).map_err(|e| GlbryError::read(&request.file_path, e))?;
        let mut state = lock(&self.state);
        if state.fail_publishes {
            return Err(GlbryError::Rpc {
                code: 0,
                message: "Not enough funds to cover this transaction.".into(),
            });
        }
        state.next_id += 1;
        let claim_id = format!("claim{}", state.next_id);
        let item = SearchItem {
            claim_id: claim_id.clone(),
            permanent_url: format!("lbry://{}#{}", request.name, claim_id),
            timestamp: Some(state.now),
            signing_channel: request.channel_id.as_ref().map(|id| SigningChannel {
                claim_id: id.clone(),
                name: None,
            }),
            value: Some(StreamValue {
                description: request.description.clone(),
            }),
            error: None,
        };
        state.contents.insert(item.permanent_url.clone(), content);
        state.claims.push((request.name.clone(), item));
        state.published.push(request.clone());
        Ok(())
    }

    fn update(&self, request: &UpdateRequest) -> Result<()> {
        let content =
            fs::read(&request.file_path).map_err(|e| GlbryError::read(&request.file_path, e))?;
        let mut state = lock(&self.state);
        let urls: Vec<String> = state
            .resolvable
            .iter()
            .filter(|(_, claim)| claim.claim_id == request.claim_id)
            .map(|(url, _)| url.clone())
            .collect();
        if urls.is_empty() {
            return Err(GlbryError::Rpc {
                code: 0,
                message: format!("Can't find the stream '{}'.", request.claim_id),
            });
        }
        for url in urls {
            state.contents.insert(url, content.clone());
        }
        state.updates.push(request.clone());
        Ok(())
    }

    fn fetch_content(&self, uri: &str, dest: &Path) -> Result<()> {
        let content = lock(&self.state)
            .contents
            .get(uri)
            .cloned()
            .ok_or_else(|| GlbryError::Rpc {
                code: 0,
                message: format!("Failed to resolve stream at '{uri}'"),
            })?;
        fs::write(dest, content).map_err(|e| GlbryError::write(dest, e))
    }
}

#[derive(Default)]
struct GitState {
    /// Refs of the user's repository, the source side of pushes.
    local_refs: BTreeMap<String, ObjectId>,
    mirror_refs: BTreeMap<String, ObjectId>,
    head: Option<String>,
    inits: usize,
    pushes: Vec<String>,
    bundles: Vec<(PathBuf, Vec<String>, Vec<ObjectId>)>,
    unbundled: Vec<PathBuf>,
    fetched: Vec<ObjectId>,
    failing_unbundles: HashSet<PathBuf>,
    fail_pushes: bool,
    /// Commit graph; commits not listed here are roots.
    parents: HashMap<ObjectId, Vec<ObjectId>>,
}

impl GitState {
    fn reaches(&self, from: ObjectId, target: ObjectId) -> bool {
        let mut pending = vec![from];
        let mut seen = HashSet::new();
        while let Some(id) = pending.pop() {
            if id == target {
                return true;
            }
            if seen.insert(id) {
                pending.extend(self.parents.get(&id).into_iter().flatten().copied());
            }
        }
        false
    }
}

/// A git toolchain that tracks refs in memory.
///
/// Bundles are small JSON files mapping ref names to ids, so a bundle
/// created by one instance can be unbundled by another.
#[derive(Clone, Default)]
pub struct InMemoryGit {
    state: Arc<Mutex<GitState>>,
}

impl InMemoryGit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a ref in the user's repository.
    pub fn set_local_ref(&self, name: &str, id: ObjectId) {
        lock(&self.state).local_refs.insert(name.to_string(), id);
    }

    /// Record `parents` as the parents of commit `id`.
    pub fn set_parents(&self, id: ObjectId, parents: Vec<ObjectId>) {
        lock(&self.state).parents.insert(id, parents);
    }

    /// Refs of the mirror.
    pub fn mirror_refs(&self) -> BTreeMap<String, ObjectId> {
        lock(&self.state).mirror_refs.clone()
    }

    pub fn inits(&self) -> usize {
        lock(&self.state).inits
    }

    pub fn pushes(&self) -> Vec<String> {
        lock(&self.state).pushes.clone()
    }

    pub fn bundles(&self) -> Vec<(PathBuf, Vec<String>, Vec<ObjectId>)> {
        lock(&self.state).bundles.clone()
    }

    pub fn unbundled(&self) -> Vec<PathBuf> {
        lock(&self.state).unbundled.clone()
    }

    pub fn fetched(&self) -> Vec<ObjectId> {
        lock(&self.state).fetched.clone()
    }

    pub fn fail_unbundle_at(&self, path: PathBuf) {
        lock(&self.state).failing_unbundles.insert(path);
    }

    pub fn fail_pushes(&self) {
        lock(&self.state).fail_pushes = true;
    }

    pub fn clear_failures(&self) {
        let mut state = lock(&self.state);
        state.failing_unbundles.clear();
        state.fail_pushes = false;
    }
}

fn failed(command: &str) -> GlbryError {
    GlbryError::Subprocess {
        command: command.to_string(),
        status: "exit status: 1".to_string(),
        stderr: String::new(),
    }
}

impl GitToolchain for InMemoryGit {
    fn show_refs(&self, _repo: &Path) -> Result<Vec<NamedRef>> {
        Ok(lock(&self.state)
            .mirror_refs
            .iter()
            .map(|(name, id)| NamedRef {
                name: name.clone(),
                id: *id,
            })
            .collect())
    }

    fn read_head(&self, _repo: &Path) -> Result<String> {
        Ok(lock(&self.state)
            .head
            .clone()
            .unwrap_or_else(|| "@refs/heads/master".to_string()))
    }

    fn create_bundle(
        &self,
        _repo: &Path,
        out: &Path,
        refs: &[String],
        exclude: &[ObjectId],
    ) -> Result<()> {
        let mut state = lock(&self.state);
        let mut bundled = BTreeMap::new();
        for name in refs {
            let id = *state
                .mirror_refs
                .get(name)
                .ok_or_else(|| failed("bundle create"))?;
            // git leaves out refs whose tip is excluded, and refuses a
            // bundle left without refs.
            if exclude.iter().any(|&x| state.reaches(x, id)) {
                return Err(failed("bundle create"));
            }
            bundled.insert(name.clone(), id.to_string());
        }
        let excluded: Vec<String> = exclude.iter().map(ObjectId::to_string).collect();
        let body = json!({ "refs": bundled, "exclude": excluded });
        fs::write(out, body.to_string()).map_err(|e| GlbryError::write(out, e))?;
        state
            .bundles
            .push((out.to_path_buf(), refs.to_vec(), exclude.to_vec()));
        Ok(())
    }

    fn unbundle(&self, _repo: &Path, bundle: &Path) -> Result<()> {
        let mut state = lock(&self.state);
        if state.failing_unbundles.contains(bundle) {
            return Err(failed("bundle unbundle"));
        }
        // Bundles not produced by create_bundle carry no refs.
        if let Some(refs) = fs::read(bundle)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<serde_json::Value>(&bytes).ok())
            .and_then(|v| v.get("refs").and_then(|r| r.as_object()).cloned())
        {
            for (name, id) in refs {
                if let Some(id) = id.as_str().and_then(|s| s.parse().ok()) {
                    state.mirror_refs.insert(name, id);
                }
            }
        }
        state.unbundled.push(bundle.to_path_buf());
        Ok(())
    }

    fn push_local(&self, _mirror: &Path, spec: &str) -> Result<()> {
        let mut state = lock(&self.state);
        if state.fail_pushes {
            return Err(failed("push"));
        }
        let (src, dst) = spec
            .trim_start_matches('+')
            .split_once(':')
            .ok_or_else(|| failed("push"))?;
        if src.is_empty() {
            state.mirror_refs.remove(dst).ok_or_else(|| failed("push"))?;
        } else {
            let id = *state.local_refs.get(src).ok_or_else(|| failed("push"))?;
            state.mirror_refs.insert(dst.to_string(), id);
        }
        state.pushes.push(spec.to_string());
        Ok(())
    }

    fn fetch_objects(&self, _mirror: &Path, ids: &[ObjectId]) -> Result<()> {
        lock(&self.state).fetched.extend_from_slice(ids);
        Ok(())
    }

    fn init_bare(&self, repo: &Path) -> Result<()> {
        fs::create_dir_all(repo).map_err(|e| GlbryError::write(repo, e))?;
        let head = repo.join("HEAD");
        fs::write(&head, "ref: refs/heads/master\n").map_err(|e| GlbryError::write(&head, e))?;
        lock(&self.state).inits += 1;
        Ok(())
    }

    fn update_ref(&self, _repo: &Path, name: &str, id: Option<ObjectId>) -> Result<()> {
        let mut state = lock(&self.state);
        match id {
            Some(id) => state.mirror_refs.insert(name.to_string(), id),
            None => state.mirror_refs.remove(name),
        };
        Ok(())
    }

    fn is_ancestor(&self, _repo: &Path, ancestor: ObjectId, descendant: ObjectId) -> Result<bool> {
        Ok(lock(&self.state).reaches(descendant, ancestor))
    }

    fn parents(&self, _repo: &Path, id: ObjectId) -> Result<Vec<ObjectId>> {
        Ok(lock(&self.state)
            .parents
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }
}
