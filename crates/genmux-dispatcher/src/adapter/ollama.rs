use async_trait::async_trait;
use genmux_common::protocol::error::Result;
use genmux_common::protocol::GenerationRequest;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::http::{send_empty, send_json, text_at};
use super::ExecutionAdapter;
use crate::node::NodeConfig;

const DEFAULT_MODEL: &str = "llama3";

/// Local Ollama server (`/api/chat`, non-streaming)
#[derive(Debug, Clone, Default)]
pub struct OllamaAdapter {
    client: Client,
}

impl OllamaAdapter {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn body(node: &NodeConfig, request: &GenerationRequest) -> Value {
        let mut options = json!({ "num_predict": request.token_budget(node.max_tokens) });
        if let Some(temperature) = request.temperature {
            options["temperature"] = json!(temperature);
        }
        json!({
            "model": node.model.as_deref().unwrap_or(DEFAULT_MODEL),
            "messages": request.messages,
            "stream": false,
            "options": options,
        })
    }
}

#[async_trait]
impl ExecutionAdapter for OllamaAdapter {
    async fn execute(
        &self,
        node: &NodeConfig,
        request: &GenerationRequest,
        timeout: Duration,
    ) -> Result<String> {
        let url = format!("{}/api/chat", node.base_url());
        let builder = self.client.post(url).json(&Self::body(node, request));

        let response = send_json(builder, timeout).await?;
        text_at(&response, "/message/content")
    }

    async fn probe(&self, node: &NodeConfig, timeout: Duration) -> Result<()> {
        let url = format!("{}/api/tags", node.base_url());
        send_empty(self.client.get(url), timeout).await
    }
}
