//! HTTP client for a running dispatcher.
//!
//! Used by the `generate` and `status` commands. Replies are returned as raw
//! JSON so the commands can print them unchanged.

use anyhow::{anyhow, bail, Context, Result};
use genmux_common::protocol::GenerationRequest;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Request, StatusCode};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use serde_json::Value;
use std::time::Duration;

/// Client-side bound on a single call; generation can be slow.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// A JSON reply with its HTTP status.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Value,
}

/// Client for the dispatcher's HTTP API.
#[derive(Clone)]
pub struct GenmuxClient {
    base_url: String,
    client: Client<HttpConnector, Full<Bytes>>,
    timeout: Duration,
}

impl GenmuxClient {
    /// Creates a client for `base_url`, which must start with `http://` or
    /// `https://`.
    pub fn new(base_url: &str) -> Result<Self> {
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            bail!(
                "Invalid server address: '{}' must start with http:// or https://",
                base_url
            );
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::builder(TokioExecutor::new()).build_http(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// True when `GET /__health` answers 200.
    pub async fn health(&self) -> Result<bool> {
        let (status, _) = self.send(Method::GET, "/__health", None).await?;
        Ok(status.is_success())
    }

    /// Fetches the cluster status.
    pub async fn status(&self) -> Result<Value> {
        self.get_json("/status").await
    }

    /// Lists registered nodes.
    pub async fn nodes(&self) -> Result<Value> {
        self.get_json("/nodes").await
    }

    /// Submits a request and waits for its resolution.
    ///
    /// A rejection (503) is a normal reply here; callers inspect `success`.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Reply> {
        let body = serde_json::to_vec(request)?;
        let (status, bytes) = self.send(Method::POST, "/generate", Some(body)).await?;
        let body = serde_json::from_slice(&bytes)
            .with_context(|| format!("Server returned non-JSON reply ({})", status))?;
        Ok(Reply { status, body })
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let (status, bytes) = self.send(Method::GET, path, None).await?;
        if !status.is_success() {
            bail!(
                "GET {} failed with {}: {}",
                path,
                status,
                String::from_utf8_lossy(&bytes)
            );
        }
        serde_json::from_slice(&bytes).with_context(|| format!("Invalid JSON from GET {}", path))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<(StatusCode, Bytes)> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = Request::builder().method(method).uri(&url);
        if body.is_some() {
            builder = builder.header("Content-Type", "application/json");
        }
        let request = builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .with_context(|| format!("Failed to build request for {}", url))?;

        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| anyhow!("Request to {} timed out after {:?}", url, self.timeout))?
            .with_context(|| format!("HTTP request to {} failed", url))?;

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .with_context(|| format!("Failed to read response from {}", url))?
            .to_bytes();

        Ok((status, bytes))
    }
}
