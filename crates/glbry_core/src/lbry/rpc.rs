//! Blocking JSON-RPC 2.0 client for the lbrynet daemon.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use ureq::Agent;

use super::ContentNetwork;
use super::types::{
    Claim, GetParams, GetResult, PublishRequest, ResolveParams, SearchPage, SearchQuery, TxResult,
    UpdateRequest, error_text,
};
use crate::error::{GlbryError, Result};

/// Publishing with `blocking: true` waits for the transaction broadcast.
const CALL_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    method: &'a str,
    params: &'a P,
    id: u64,
}

#[derive(Deserialize)]
struct RpcResponse<R> {
    // Absent fields read as `None`.
    result: Option<R>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Clone)]
pub struct LbrynetClient {
    agent: Agent,
    url: String,
}

impl LbrynetClient {
    /// Client for the daemon listening at `url`, e.g. `http://localhost:5279`.
    pub fn new(url: impl Into<String>) -> Self {
        let config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(CALL_TIMEOUT))
            .build();
        Self {
            agent: config.into(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn call<P: Serialize, R: DeserializeOwned>(&self, method: &str, params: &P) -> Result<R> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: 0,
        };
        debug!(method, url = %self.url, "lbrynet call");

        let mut response = self
            .agent
            .post(&self.url)
            .send_json(&request)
            .map_err(|e| GlbryError::Network(format!("{method}: {e}")))?;
        let status = response.status();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| GlbryError::Network(format!("{method}: {e}")))?;
        debug!(method, %status, body_len = body.len(), "lbrynet response");

        let envelope: RpcResponse<R> = serde_json::from_str(&body).map_err(|e| {
            if status.is_success() {
                GlbryError::Json(e)
            } else {
                GlbryError::Network(format!("{method}: HTTP {status}"))
            }
        })?;
        if let Some(error) = envelope.error {
            return Err(GlbryError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        envelope.result.ok_or_else(|| GlbryError::Rpc {
            code: 0,
            message: format!("{method} returned no result"),
        })
    }
}

fn item_error(error: Option<&Value>) -> Result<()> {
    match error {
        Some(error) => Err(GlbryError::Rpc {
            code: 0,
            message: error_text(error),
        }),
        None => Ok(()),
    }
}

impl ContentNetwork for LbrynetClient {
    fn resolve(&self, url: &str) -> Result<Claim> {
        let params = ResolveParams {
            urls: url,
            include_is_my_output: true,
        };
        let mut claims: std::collections::HashMap<String, Claim> = self.call("resolve", &params)?;
        let claim = claims.remove(url).ok_or_else(|| GlbryError::Rpc {
            code: 0,
            message: format!("resolve returned nothing for {url}"),
        })?;
        item_error(claim.error.as_ref())?;
        Ok(claim)
    }

    fn search(&self, query: &SearchQuery) -> Result<SearchPage> {
        self.call("claim_search", query)
    }

    fn publish(&self, request: &PublishRequest) -> Result<()> {
        let result: TxResult = self.call("stream_create", request)?;
        item_error(result.error.as_ref())
    }

    fn update(&self, request: &UpdateRequest) -> Result<()> {
        let result: TxResult = self.call("stream_update", request)?;
        item_error(result.error.as_ref())
    }

    fn fetch_content(&self, uri: &str, dest: &Path) -> Result<()> {
        let result: GetResult = self.call("get", &GetParams { uri })?;
        item_error(result.error.as_ref())?;
        if result.blobs_remaining > 0 {
            return Err(GlbryError::Network(format!(
                "{uri} is incomplete ({} blobs remaining); it may have changed recently, try again in about a minute",
                result.blobs_remaining
            )));
        }
        let source = result
            .download_path
            .ok_or_else(|| GlbryError::Network(format!("{uri}: daemon reported no download path")))?;

        if let Err(e) = fs::rename(&source, dest) {
            // The daemon's download directory may be on another filesystem.
            debug!(from = %source.display(), to = %dest.display(), "rename failed ({e}), copying");
            fs::copy(&source, dest).map_err(|e| GlbryError::write(dest, e))?;
            if let Err(e) = fs::remove_file(&source) {
                warn!(path = %source.display(), "could not remove downloaded file: {e}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    /// Serve exactly one HTTP request with `body`, returning the request
    /// body the client sent.
    fn serve_once(body: String) -> (String, JoinHandle<serde_json::Value>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                let line = line.trim_end();
                if line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':')
                    && name.eq_ignore_ascii_case("content-length")
                {
                    content_length = value.trim().parse().unwrap();
                }
            }
            let mut request = vec![0u8; content_length];
            reader.read_exact(&mut request).unwrap();
            let mut stream = reader.into_inner();
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            )
            .unwrap();
            stream.flush().unwrap();
            serde_json::from_slice(&request).unwrap()
        });
        (url, handle)
    }

    #[test]
    fn test_resolve_sends_request_and_reads_claim() {
        let (url, server) = serve_once(
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": 0,
                "result": {
                    "lbry://@alice": {
                        "claim_id": "A1",
                        "normalized_name": "@alice",
                        "is_my_output": true
                    }
                }
            })
            .to_string(),
        );
        let claim = LbrynetClient::new(url).resolve("lbry://@alice").unwrap();
        assert_eq!(claim.claim_id, "A1");
        assert_eq!(claim.display_name(), "@alice");
        assert!(claim.is_mine());

        let request = server.join().unwrap();
        assert_eq!(request["jsonrpc"], "2.0");
        assert_eq!(request["method"], "resolve");
        assert_eq!(request["params"]["urls"], "lbry://@alice");
        assert_eq!(request["params"]["include_is_my_output"], true);
    }

    #[test]
    fn test_resolve_item_error() {
        let (url, server) = serve_once(
            serde_json::json!({
                "jsonrpc": "2.0",
                "result": {
                    "lbry://repo": {"error": {"name": "NOT_FOUND", "text": "Could not find claim"}}
                }
            })
            .to_string(),
        );
        let err = LbrynetClient::new(url).resolve("lbry://repo").unwrap_err();
        server.join().unwrap();
        match err {
            GlbryError::Rpc { code, message } => {
                assert_eq!(code, 0);
                assert_eq!(message, "Could not find claim");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_rpc_error_envelope() {
        let (url, server) = serve_once(
            r#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"Invalid method"}}"#.to_string(),
        );
        let err = LbrynetClient::new(url)
            .search(&SearchQuery::oldest_first("repo-0", vec![]))
            .unwrap_err();
        let request = server.join().unwrap();
        assert_eq!(request["method"], "claim_search");
        assert_eq!(request["params"]["order_by"][0], "^height");
        assert!(matches!(err, GlbryError::Rpc { code: -32601, .. }));
    }

    #[test]
    fn test_get_moves_download() {
        let dir = tempfile::tempdir().unwrap();
        let downloaded = dir.path().join("daemon-download");
        fs::write(&downloaded, b"bundle bytes").unwrap();
        let (url, server) = serve_once(
            serde_json::json!({
                "jsonrpc": "2.0",
                "result": {"download_path": downloaded, "blobs_remaining": 0}
            })
            .to_string(),
        );
        let dest = dir.path().join("0.bundle");
        LbrynetClient::new(url)
            .fetch_content("lbry://repo-0#c1", &dest)
            .unwrap();
        let request = server.join().unwrap();
        assert_eq!(request["params"]["uri"], "lbry://repo-0#c1");
        assert_eq!(fs::read(&dest).unwrap(), b"bundle bytes");
        assert!(!downloaded.exists());
    }

    #[test]
    fn test_get_incomplete_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let (url, server) = serve_once(
            serde_json::json!({
                "jsonrpc": "2.0",
                "result": {"download_path": "/nonexistent", "blobs_remaining": 3}
            })
            .to_string(),
        );
        let err = LbrynetClient::new(url)
            .fetch_content("lbry://repo-0#c1", &dir.path().join("0.bundle"))
            .unwrap_err();
        server.join().unwrap();
        assert!(matches!(err, GlbryError::Network(_)));
    }

    #[test]
    fn test_unreachable_daemon_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let err = LbrynetClient::new(url).resolve("lbry://x").unwrap_err();
        assert!(matches!(err, GlbryError::Network(_)));
    }
}
