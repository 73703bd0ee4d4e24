use genmux_common::protocol::error::{DispatchError, Result};
use genmux_common::protocol::NodeId;
use genmux_metrics::{ClusterStats, ClusterStatsSnapshot};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::node::{NodeConfig, NodeStatus, NodeSummary};
use crate::registry::NodeRegistry;
use crate::selector::WeightedSelector;
use crate::tracker::{record_outcome, Outcome, OutcomeSource, StatusChange};

/// Everything the dispatcher guards behind its cluster lock.
#[derive(Debug)]
pub struct ClusterState {
    pub registry: NodeRegistry,
    pub stats: ClusterStats,
    pub selector: WeightedSelector,
}

impl ClusterState {
    pub fn new(selector: WeightedSelector) -> Self {
        Self {
            registry: NodeRegistry::new(),
            stats: ClusterStats::new(),
            selector,
        }
    }

    /// Selects a node for one traffic attempt and reserves a unit of its load.
    ///
    /// Returns a copy of the node's configuration so the call can proceed
    /// without holding the lock.
    pub fn acquire(&mut self, load_ceiling: u32) -> Result<(NodeId, NodeConfig)> {
        let id = self.selector.select(self.registry.list(), load_ceiling)?;
        let node = self
            .registry
            .get_mut(id)
            .ok_or(DispatchError::NoAvailableNode)?;
        node.current_load += 1;
        node.last_used = Some(SystemTime::now());
        Ok((id, node.config.clone()))
    }

    /// Records an outcome for `id`.
    ///
    /// A node removed while its attempt was in flight no longer has state to
    /// update, but a traffic attempt still counts toward the cluster totals.
    pub fn record(&mut self, id: NodeId, outcome: Outcome) -> Option<StatusChange> {
        match self.registry.get_mut(id) {
            Some(node) => record_outcome(node, &mut self.stats, outcome),
            None => {
                if outcome.source == OutcomeSource::Traffic {
                    self.stats.record(outcome.success, outcome.latency);
                }
                None
            }
        }
    }

    pub fn status(&self, queue_length: usize, active_requests: usize) -> ClusterStatus {
        let nodes: Vec<NodeSummary> = self.registry.list().iter().map(|n| n.summary()).collect();
        ClusterStatus {
            total_nodes: nodes.len(),
            active_nodes: self.registry.count_with_status(NodeStatus::Active),
            unhealthy_nodes: self.registry.count_with_status(NodeStatus::Unhealthy),
            nodes,
            stats: self.stats.snapshot(),
            queue_length,
            active_requests,
        }
    }
}

/// Point-in-time view of the whole pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterStatus {
    pub total_nodes: usize,
    pub active_nodes: usize,
    pub unhealthy_nodes: usize,
    pub nodes: Vec<NodeSummary>,
    pub stats: ClusterStatsSnapshot,
    pub queue_length: usize,
    pub active_requests: usize,
}
