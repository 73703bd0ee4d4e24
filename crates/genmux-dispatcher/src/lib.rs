//! Genmux Dispatcher
//!
//! Routes generation requests across a pool of heterogeneous model backends
//! with weighted, health-aware node selection, a global concurrency ceiling
//! with FIFO queueing, per-call timeouts and failure-driven retry.

pub mod adapter;
pub mod admission;
pub mod cluster;
pub mod config;
pub mod dispatcher;
pub mod events;
pub mod health_checker;
pub mod http_server;
pub mod node;
pub mod registry;
pub mod retry;
pub mod selector;
pub mod tracker;

pub use adapter::{AdapterRegistry, AnthropicAdapter, ExecutionAdapter, OllamaAdapter, OpenAiAdapter};
pub use admission::{Admission, AdmissionController};
pub use cluster::{ClusterState, ClusterStatus};
pub use config::{DispatcherConfig, NodeDefaults};
pub use dispatcher::{CompletionHandle, Dispatcher};
pub use events::DispatchEvent;
pub use health_checker::{HealthCheckConfig, HealthProber, ProbeSweep};
pub use http_server::HttpServer;
pub use node::{Node, NodeConfig, NodeKind, NodeSpec, NodeStatus, NodeSummary, NodeUpdate};
pub use registry::NodeRegistry;
pub use retry::{run_with_retry, RetryConfig, Retried};
pub use selector::WeightedSelector;
pub use tracker::{record_outcome, Outcome, OutcomeSource, StatusChange};
