use async_trait::async_trait;
use genmux_common::protocol::error::Result;
use genmux_common::protocol::{GenerationRequest, Role};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::time::Duration;

use super::http::{malformed, send_empty, send_json};
use super::ExecutionAdapter;
use crate::node::NodeConfig;

const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const API_VERSION: &str = "2023-06-01";

/// Anthropic Messages API (`/v1/messages`).
#[derive(Debug, Clone, Default)]
pub struct AnthropicAdapter {
    client: Client,
}

impl AnthropicAdapter {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// System turns move to the top-level `system` field; the API rejects
    /// them inside `messages`.
    fn body(node: &NodeConfig, request: &GenerationRequest) -> Value {
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let messages: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect();

        let mut body = json!({
            "model": node.model.as_deref().unwrap_or(DEFAULT_MODEL),
            "max_tokens": request.token_budget(node.max_tokens),
            "messages": messages,
        });
        if !system.is_empty() {
            body["system"] = json!(system.join("\n\n"));
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }

    fn headers(&self, builder: RequestBuilder, node: &NodeConfig) -> RequestBuilder {
        let builder = builder.header("anthropic-version", API_VERSION);
        match &node.credentials {
            Some(key) => builder.header("x-api-key", key),
            None => builder,
        }
    }
}

#[async_trait]
impl ExecutionAdapter for AnthropicAdapter {
    async fn execute(
        &self,
        node: &NodeConfig,
        request: &GenerationRequest,
        timeout: Duration,
    ) -> Result<String> {
        let url = format!("{}/v1/messages", node.base_url());
        let builder = self
            .headers(self.client.post(url), node)
            .json(&Self::body(node, request));

        let response = send_json(builder, timeout).await?;
        let blocks = response
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed(200, "missing content"))?;

        Ok(blocks
            .iter()
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""))
    }

    async fn probe(&self, node: &NodeConfig, timeout: Duration) -> Result<()> {
        let url = format!("{}/v1/models", node.base_url());
        send_empty(self.headers(self.client.get(url), node), timeout).await
    }
}
