use async_trait::async_trait;
use genmux_common::protocol::error::Result;
use genmux_common::protocol::GenerationRequest;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::http::{send_empty, send_json, text_at};
use super::ExecutionAdapter;
use crate::node::NodeConfig;

const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI-compatible chat completions (`/v1/chat/completions`).
///
/// Also serves self-hosted servers that mimic the OpenAI API.
#[derive(Debug, Clone, Default)]
pub struct OpenAiAdapter {
    client: Client,
}

impl OpenAiAdapter {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn body(node: &NodeConfig, request: &GenerationRequest) -> Value {
        let mut body = json!({
            "model": node.model.as_deref().unwrap_or(DEFAULT_MODEL),
            "messages": request.messages,
            "max_tokens": request.token_budget(node.max_tokens),
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }

    fn authorize(&self, builder: reqwest::RequestBuilder, node: &NodeConfig) -> reqwest::RequestBuilder {
        match &node.credentials {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl ExecutionAdapter for OpenAiAdapter {
    async fn execute(
        &self,
        node: &NodeConfig,
        request: &GenerationRequest,
        timeout: Duration,
    ) -> Result<String> {
        let url = format!("{}/v1/chat/completions", node.base_url());
        let builder = self
            .authorize(self.client.post(url), node)
            .json(&Self::body(node, request));

        let response = send_json(builder, timeout).await?;
        text_at(&response, "/choices/0/message/content")
    }

    async fn probe(&self, node: &NodeConfig, timeout: Duration) -> Result<()> {
        let url = format!("{}/v1/models", node.base_url());
        send_empty(self.authorize(self.client.get(url), node), timeout).await
    }
}
