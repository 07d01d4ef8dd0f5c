//! Request and response shapes of the lbrynet JSON-RPC API.
//!
//! Only the fields gitlbry reads are modelled; everything else in the
//! daemon's (large) claim objects is ignored.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sort key asking claim_search for the oldest claims first.
pub const OLDEST_FIRST: &str = "^height";

/// Largest page claim_search will return.
pub const MAX_PAGE_SIZE: u64 = 50;

/// The channel a claim was signed with.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SigningChannel {
    pub claim_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Result of resolving one address.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Claim {
    #[serde(default)]
    pub claim_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub normalized_name: Option<String>,
    #[serde(default)]
    pub permanent_url: Option<String>,
    #[serde(default)]
    pub signing_channel: Option<SigningChannel>,
    /// Whether the local wallet controls this claim. `None` when unknown.
    #[serde(default)]
    pub is_my_output: Option<bool>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl Claim {
    pub fn is_mine(&self) -> bool {
        self.is_my_output.unwrap_or(false)
    }

    /// The claim name, preferring the normalized form.
    pub fn display_name(&self) -> &str {
        self.normalized_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or_default()
    }
}

/// Parameters of `claim_search`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchQuery {
    pub name: String,
    pub channel_ids: Vec<String>,
    pub page: u64,
    pub page_size: u64,
    pub order_by: Vec<String>,
}

impl SearchQuery {
    /// First page of claims named `name` signed by any of `channel_ids`,
    /// oldest first.
    pub fn oldest_first(name: &str, channel_ids: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            channel_ids,
            page: 1,
            page_size: MAX_PAGE_SIZE,
            order_by: vec![OLDEST_FIRST.to_string()],
        }
    }

    /// The same query for page `page`.
    pub fn with_page(&self, page: u64) -> Self {
        Self {
            page,
            ..self.clone()
        }
    }
}

/// The `value` of a stream claim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StreamValue {
    #[serde(default)]
    pub description: Option<String>,
}

/// One `claim_search` result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchItem {
    #[serde(default)]
    pub claim_id: String,
    #[serde(default)]
    pub permanent_url: String,
    /// Block timestamp; absent for unconfirmed claims.
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub signing_channel: Option<SigningChannel>,
    #[serde(default)]
    pub value: Option<StreamValue>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl SearchItem {
    /// The claim description, with a missing one read as `""`.
    pub fn description(&self) -> &str {
        self.value
            .as_ref()
            .and_then(|v| v.description.as_deref())
            .unwrap_or_default()
    }
}

/// A page of `claim_search` results.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub items: Vec<SearchItem>,
    #[serde(default)]
    pub page: u64,
    #[serde(default)]
    pub page_size: u64,
    #[serde(default)]
    pub total_items: u64,
    #[serde(default)]
    pub total_pages: u64,
}

/// Parameters of `stream_create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishRequest {
    pub name: String,
    pub bid: String,
    pub file_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub blocking: bool,
}

/// Parameters of `stream_update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateRequest {
    pub claim_id: String,
    pub file_path: PathBuf,
    pub blocking: bool,
}

/// Parameters of `resolve`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ResolveParams<'a> {
    pub urls: &'a str,
    pub include_is_my_output: bool,
}

/// Parameters of `get`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct GetParams<'a> {
    pub uri: &'a str,
}

/// Result of `get`.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct GetResult {
    #[serde(default)]
    pub download_path: Option<PathBuf>,
    #[serde(default)]
    pub blobs_remaining: u64,
    #[serde(default)]
    pub error: Option<Value>,
}

/// Result of `stream_create` / `stream_update`; only errors matter.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct TxResult {
    #[serde(default)]
    pub error: Option<Value>,
}

/// Human-readable text of a per-item SDK error, which the daemon reports
/// either as a string or as `{"name": .., "text": ..}`.
pub fn error_text(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}
