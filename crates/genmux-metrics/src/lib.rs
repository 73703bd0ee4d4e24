//! Genmux Metrics
//!
//! This crate provides the statistics the dispatcher keeps about its backend
//! pool: a bounded latency window per node, the 0-100 health score derived
//! from it, and the process-wide dispatch counters.
//!
//! # Architecture
//!
//! - [`LatencyWindow`]: Ring buffer of the most recent latency samples (100 per node)
//! - [`NodeHealth`]: Success/error counters plus the latency window, producing the health score
//! - [`ClusterStats`]: Total/successful/failed counters and the running average response time
//! - [`ClusterStatsSnapshot`], [`HealthSnapshot`]: Serializable views for status reporting
//!
//! # Usage Example
//!
//! ```rust
//! use genmux_metrics::{ClusterStats, NodeHealth};
//! use std::time::Duration;
//!
//! let mut health = NodeHealth::new();
//! let mut stats = ClusterStats::new();
//!
//! let latency = Duration::from_millis(420);
//! health.record(true, latency);
//! stats.record(true, latency);
//!
//! assert_eq!(stats.snapshot().successful_requests, 1);
//! assert!(health.score() > 90);
//! ```
//!
//! # Thread Safety
//!
//! None of these types synchronise internally. The dispatcher owns them
//! behind its cluster lock, so every update to a node's counters is
//! serialised with selection and status changes.

mod cluster;
mod health;
mod snapshot;
mod window;

pub use cluster::ClusterStats;
pub use health::{compute_score, NodeHealth, INITIAL_HEALTH_SCORE, LATENCY_CEILING_MS, UNHEALTHY_THRESHOLD};
pub use snapshot::{epoch_ms, ClusterStatsSnapshot, HealthSnapshot};
pub use window::{LatencyWindow, LATENCY_WINDOW_SIZE};
