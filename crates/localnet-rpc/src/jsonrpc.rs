//! Minimal JSON-RPC 2.0 transport over HTTP.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{RpcError, RpcResult};

const MAX_BODY_IN_ERROR: usize = 512;

#[derive(Serialize)]
struct Request<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct Response<R> {
    result: Option<R>,
    error: Option<ErrorObject>,
}

#[derive(Deserialize)]
struct ErrorObject {
    code: i64,
    message: String,
}

/// JSON-RPC caller bound to one node's base URL.
#[derive(Debug, Clone)]
pub struct JsonRpcClient {
    base_url: String,
    client: reqwest::Client,
    next_id: Arc<AtomicU64>,
}

impl JsonRpcClient {
    /// Create a caller for `base_url` (e.g. `http://127.0.0.1:9650`) with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> RpcResult<Self> {
        let base_url = base_url.trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(RpcError::InvalidUrl(base_url.to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| RpcError::Transport {
                endpoint: base_url.to_string(),
                source,
            })?;
        Ok(Self {
            base_url: base_url.to_string(),
            client,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Base URL without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Call `method` on the API mounted at `path` (e.g. `/ext/info`).
    pub async fn call<P, R>(&self, path: &str, method: &str, params: P) -> RpcResult<R>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let endpoint = format!("{}{}", self.base_url, path);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(%endpoint, method, id, "rpc call");

        let request = Request {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        let transport = |source| RpcError::Transport {
            endpoint: endpoint.clone(),
            source,
        };

        let response = self
            .client
            .post(&endpoint)
            .json(&request)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        let body = response.text().await.map_err(transport)?;

        let envelope: Response<R> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(RpcError::Http {
                    endpoint,
                    status: status.as_u16(),
                    body: truncate(&body),
                });
            }
            Err(err) => {
                return Err(RpcError::Decode {
                    method: method.to_string(),
                    reason: err.to_string(),
                });
            }
        };

        if let Some(error) = envelope.error {
            return Err(RpcError::Remote {
                method: method.to_string(),
                code: error.code,
                message: error.message,
            });
        }
        envelope.result.ok_or_else(|| RpcError::Decode {
            method: method.to_string(),
            reason: "response carries neither result nor error".to_string(),
        })
    }
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_BODY_IN_ERROR) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
