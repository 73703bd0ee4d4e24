//! Outcome recording: the single place node health, load and cluster
//! counters are updated after an execution attempt.

use genmux_common::protocol::NodeId;
use genmux_metrics::ClusterStats;
use std::time::Duration;
use tracing::{debug, warn};

use crate::node::{Node, NodeStatus};

/// Where an outcome came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeSource {
    /// A dispatched request attempt; holds one unit of the node's load
    Traffic,
    /// A background liveness probe
    Probe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub success: bool,
    pub latency: Duration,
    pub source: OutcomeSource,
}

impl Outcome {
    pub fn traffic(success: bool, latency: Duration) -> Self {
        Self {
            success,
            latency,
            source: OutcomeSource::Traffic,
        }
    }

    pub fn probe(success: bool, latency: Duration) -> Self {
        Self {
            success,
            latency,
            source: OutcomeSource::Probe,
        }
    }
}

/// A node's status transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub node: NodeId,
    pub from: NodeStatus,
    pub to: NodeStatus,
}

/// Feeds one outcome into a node's health and, for traffic, into its load
/// and the cluster counters.
///
/// Demotes the node to `Unhealthy` when the recomputed score falls below
/// the threshold. Never promotes: recovery belongs to the prober.
pub fn record_outcome(
    node: &mut Node,
    stats: &mut ClusterStats,
    outcome: Outcome,
) -> Option<StatusChange> {
    let score = node.health.record(outcome.success, outcome.latency);

    if outcome.source == OutcomeSource::Traffic {
        node.current_load = node.current_load.saturating_sub(1);
        stats.record(outcome.success, outcome.latency);
    }

    debug!(
        node = %node.id,
        success = outcome.success,
        latency_ms = outcome.latency.as_millis() as u64,
        score,
        "Recorded {:?} outcome",
        outcome.source
    );

    if node.health.is_unhealthy() && node.status == NodeStatus::Active {
        node.status = NodeStatus::Unhealthy;
        warn!(
            "Node {} ({}) marked unhealthy, health score {}",
            node.config.name, node.id, score
        );
        return Some(StatusChange {
            node: node.id,
            from: NodeStatus::Active,
            to: NodeStatus::Unhealthy,
        });
    }

    None
}
