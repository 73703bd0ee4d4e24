//! Execution adapters
//!
//! An adapter translates the backend-agnostic [`GenerationRequest`] into one
//! vendor's wire format, performs the call and extracts the generated text.
//! Adapters are keyed by [`NodeKind`] string in an [`AdapterRegistry`] that
//! the dispatcher receives at construction.

mod anthropic;
mod http;
mod ollama;
mod openai;

pub use anthropic::AnthropicAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;

use async_trait::async_trait;
use genmux_common::protocol::error::Result;
use genmux_common::protocol::GenerationRequest;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::node::{NodeConfig, NodeKind};

#[async_trait]
pub trait ExecutionAdapter: Send + Sync {
    /// Performs one generation call against `node` and returns the text.
    ///
    /// Implementations must honour `timeout` and the node's token budget.
    async fn execute(
        &self,
        node: &NodeConfig,
        request: &GenerationRequest,
        timeout: Duration,
    ) -> Result<String>;

    /// Lightweight liveness check. Defaults to a one-token generation.
    async fn probe(&self, node: &NodeConfig, timeout: Duration) -> Result<()> {
        self.execute(node, &GenerationRequest::probe(), timeout)
            .await
            .map(|_| ())
    }
}

/// Kind-to-adapter lookup table
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn ExecutionAdapter>>,
}

impl AdapterRegistry {
    /// Empty registry; every kind is unknown until registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry serving the built-in `openai`, `anthropic` and `ollama` kinds.
    pub fn with_defaults() -> Self {
        Self::new()
            .with(NodeKind::OpenAi, OpenAiAdapter::new())
            .with(NodeKind::Anthropic, AnthropicAdapter::new())
            .with(NodeKind::Ollama, OllamaAdapter::new())
    }

    pub fn with<A>(mut self, kind: impl Into<NodeKind>, adapter: A) -> Self
    where
        A: ExecutionAdapter + 'static,
    {
        self.register(kind, Arc::new(adapter));
        self
    }

    /// Installs or replaces the adapter for `kind`.
    pub fn register(&mut self, kind: impl Into<NodeKind>, adapter: Arc<dyn ExecutionAdapter>) {
        self.adapters.insert(kind.into().as_str().to_string(), adapter);
    }

    pub fn get(&self, kind: &NodeKind) -> Option<Arc<dyn ExecutionAdapter>> {
        self.adapters.get(kind.as_str()).cloned()
    }

    pub fn contains(&self, kind: &NodeKind) -> bool {
        self.adapters.contains_key(kind.as_str())
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.adapters.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
