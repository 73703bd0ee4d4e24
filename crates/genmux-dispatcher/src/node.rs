use genmux_common::protocol::error::{DispatchError, Result};
use genmux_common::protocol::NodeId;
use genmux_metrics::{epoch_ms, HealthSnapshot, NodeHealth};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime};

/// Protocol family a node speaks, which selects the adapter that serves it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    OpenAi,
    Anthropic,
    Ollama,
    /// Any other family; served by an adapter registered under this name
    Custom(String),
}

impl NodeKind {
    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::OpenAi => "openai",
            NodeKind::Anthropic => "anthropic",
            NodeKind::Ollama => "ollama",
            NodeKind::Custom(name) => name,
        }
    }
}

/// Kind names are case-insensitive; custom names are stored lowercased.
impl From<String> for NodeKind {
    fn from(mut value: String) -> Self {
        value.make_ascii_lowercase();
        match value.as_str() {
            "openai" => NodeKind::OpenAi,
            "anthropic" => NodeKind::Anthropic,
            "ollama" => NodeKind::Ollama,
            _ => NodeKind::Custom(value),
        }
    }
}

impl From<&str> for NodeKind {
    fn from(value: &str) -> Self {
        NodeKind::from(value.to_string())
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a node takes part in selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Active,
    /// Excluded from selection until a probe succeeds
    Unhealthy,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Active => f.write_str("active"),
            NodeStatus::Unhealthy => f.write_str("unhealthy"),
        }
    }
}

/// Registration input for a node.
///
/// Optional fields fall back to the dispatcher's defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSpec {
    pub name: String,
    pub kind: NodeKind,
    pub endpoint: String,
    #[serde(default)]
    pub credentials: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl NodeSpec {
    pub fn new(name: impl Into<String>, kind: impl Into<NodeKind>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            endpoint: endpoint.into(),
            credentials: None,
            model: None,
            weight: None,
            max_tokens: None,
            timeout_ms: None,
        }
    }

    pub fn with_credentials(mut self, credentials: impl Into<String>) -> Self {
        self.credentials = Some(credentials.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }
}

/// Shallow-merge patch for a registered node's configuration.
///
/// `None` fields are left untouched. The node kind cannot be changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub credentials: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Effective configuration of a registered node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    pub name: String,
    pub kind: NodeKind,
    pub endpoint: String,
    pub credentials: Option<String>,
    pub model: Option<String>,
    pub weight: f64,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl NodeConfig {
    /// Resolves a spec against defaults and validates it.
    pub fn from_spec(spec: NodeSpec, default_max_tokens: u32, default_timeout: Duration) -> Result<Self> {
        let config = Self {
            name: spec.name,
            kind: spec.kind,
            endpoint: spec.endpoint,
            credentials: spec.credentials,
            model: spec.model,
            weight: spec.weight.unwrap_or(1.0),
            max_tokens: spec.max_tokens.unwrap_or(default_max_tokens),
            timeout: spec
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(default_timeout),
        };
        config.validate()?;
        Ok(config)
    }

    /// Applies a patch, returning the merged configuration without mutating `self`.
    pub fn merged(&self, update: NodeUpdate) -> Result<Self> {
        let mut merged = self.clone();
        if let Some(name) = update.name {
            merged.name = name;
        }
        if let Some(endpoint) = update.endpoint {
            merged.endpoint = endpoint;
        }
        if let Some(credentials) = update.credentials {
            merged.credentials = Some(credentials);
        }
        if let Some(model) = update.model {
            merged.model = Some(model);
        }
        if let Some(weight) = update.weight {
            merged.weight = weight;
        }
        if let Some(max_tokens) = update.max_tokens {
            merged.max_tokens = max_tokens;
        }
        if let Some(timeout_ms) = update.timeout_ms {
            merged.timeout = Duration::from_millis(timeout_ms);
        }
        merged.validate()?;
        Ok(merged)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DispatchError::InvalidConfig("node name must not be empty".to_string()));
        }
        if self.endpoint.trim().is_empty() {
            return Err(DispatchError::InvalidConfig(format!(
                "node '{}' has an empty endpoint",
                self.name
            )));
        }
        if !self.weight.is_finite() || self.weight <= 0.0 {
            return Err(DispatchError::InvalidConfig(format!(
                "node '{}' weight must be positive (got {})",
                self.name, self.weight
            )));
        }
        if self.max_tokens == 0 {
            return Err(DispatchError::InvalidConfig(format!(
                "node '{}' max_tokens must be greater than zero",
                self.name
            )));
        }
        if self.timeout.is_zero() {
            return Err(DispatchError::InvalidConfig(format!(
                "node '{}' timeout must be greater than zero",
                self.name
            )));
        }
        Ok(())
    }

    /// Endpoint without a trailing slash, ready for path joining.
    pub fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }
}

/// A registered backend node with its runtime state.
///
/// Runtime fields are only mutated by the dispatcher: `current_load` by
/// selection and outcome recording, `health` and `status` by the tracker and
/// the prober.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub config: NodeConfig,
    pub status: NodeStatus,
    pub current_load: u32,
    pub health: NodeHealth,
    pub last_used: Option<SystemTime>,
    pub registered_at: SystemTime,
}

impl Node {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            id: NodeId::new(),
            config,
            status: NodeStatus::Active,
            current_load: 0,
            health: NodeHealth::new(),
            last_used: None,
            registered_at: SystemTime::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }

    pub fn health_score(&self) -> u8 {
        self.health.score()
    }

    /// Selection mass: configured weight scaled by the health fraction.
    pub fn effective_weight(&self) -> f64 {
        self.config.weight * (self.health.score() as f64 / 100.0)
    }

    /// Active and below the per-node in-flight ceiling.
    pub fn is_eligible(&self, load_ceiling: u32) -> bool {
        self.is_active() && self.current_load < load_ceiling
    }

    pub fn summary(&self) -> NodeSummary {
        NodeSummary {
            id: self.id,
            name: self.config.name.clone(),
            kind: self.config.kind.clone(),
            endpoint: self.config.endpoint.clone(),
            status: self.status,
            current_load: self.current_load,
            weight: self.config.weight,
            health: HealthSnapshot::from_health(&self.health),
            last_used_ms: self.last_used.map(epoch_ms),
            registered_at_ms: epoch_ms(self.registered_at),
        }
    }
}

/// Serializable per-node entry of the cluster status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSummary {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub endpoint: String,
    pub status: NodeStatus,
    pub current_load: u32,
    pub weight: f64,
    #[serde(flatten)]
    pub health: HealthSnapshot,
    pub last_used_ms: Option<u64>,
    pub registered_at_ms: u64,
}
