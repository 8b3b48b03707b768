//! aria2 JSON-RPC client
//!
//! Only the handful of calls the converter needs. Every call carries the
//! `token:` secret as its first parameter when one is configured.

use crate::error::CrawlError;
use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

/// Default endpoint of a local aria2 daemon
pub const DEFAULT_RPC_URL: &str = "http://localhost:6800/jsonrpc";

/// Download options passed to aria2, all values are strings on the wire
pub type Aria2Options = BTreeMap<String, String>;

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: String,
    method: &'a str,
    params: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Subset of `aria2.tellStatus` / `aria2.tellActive` fields
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadStatus {
    pub gid: Option<String>,
    pub status: Option<String>,
    pub info_hash: Option<String>,
    pub error_message: Option<String>,
}

/// Client for an aria2 daemon's JSON-RPC interface
pub struct Aria2Client {
    client: reqwest::Client,
    rpc_url: String,
    secret: Option<String>,
    request_id: AtomicU64,
}

impl Aria2Client {
    /// Create a client; `secret` may be given with or without its `token:` prefix
    pub fn new(rpc_url: impl Into<String>, secret: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let secret = secret.filter(|s| !s.is_empty()).map(|s| {
            if s.starts_with("token:") {
                s
            } else {
                format!("token:{}", s)
            }
        });

        Self {
            client,
            rpc_url: rpc_url.into(),
            secret,
            request_id: AtomicU64::new(1),
        }
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    fn params(&self, params: Vec<Value>) -> Vec<Value> {
        match &self.secret {
            Some(token) => std::iter::once(Value::String(token.clone())).chain(params).collect(),
            None => params,
        }
    }

    async fn call<R: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<R> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.request_id.fetch_add(1, Ordering::Relaxed).to_string(),
            method,
            params: self.params(params),
        };
        trace!("aria2 request {} ({})", method, request.id);

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CrawlError::rpc_error_full("Failed to send request", method, e.to_string()))?;

        let status = response.status();
        let body: JsonRpcResponse<R> = response.json().await.map_err(|e| {
            CrawlError::rpc_error_full(format!("Invalid response (HTTP {})", status), method, e.to_string())
        })?;

        if let Some(error) = body.error {
            return Err(CrawlError::rpc_error_full(
                format!("aria2 returned error {}", error.code),
                method,
                error.message,
            )
            .into());
        }
        body.result
            .ok_or_else(|| CrawlError::rpc_error_full("Response has no result", method, "missing result").into())
    }

    async fn call_ok(&self, method: &str, params: Vec<Value>) -> Result<()> {
        let reply: String = self.call(method, params).await?;
        if reply != "OK" {
            return Err(CrawlError::rpc_error_full("Unexpected reply", method, reply).into());
        }
        Ok(())
    }

    /// Queue a download and return its gid
    pub async fn add_uri(&self, uri: &str, options: &Aria2Options) -> Result<String> {
        let gid: String = self.call("aria2.addUri", vec![json!([uri]), json!(options)]).await?;
        debug!("aria2 accepted {} as {}", uri, gid);
        Ok(gid)
    }

    pub async fn change_global_option(&self, options: &Aria2Options) -> Result<()> {
        self.call_ok("aria2.changeGlobalOption", vec![json!(options)]).await
    }

    pub async fn tell_status(&self, gid: &str, keys: &[&str]) -> Result<DownloadStatus> {
        self.call("aria2.tellStatus", vec![json!(gid), json!(keys)]).await
    }

    pub async fn tell_active(&self, keys: &[&str]) -> Result<Vec<DownloadStatus>> {
        self.call("aria2.tellActive", vec![json!(keys)]).await
    }

    pub async fn remove_download_result(&self, gid: &str) -> Result<()> {
        self.call_ok("aria2.removeDownloadResult", vec![json!(gid)]).await
    }
}
