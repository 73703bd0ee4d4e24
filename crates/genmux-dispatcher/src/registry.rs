use genmux_common::protocol::error::{DispatchError, Result};
use genmux_common::protocol::NodeId;
use tracing::info;

use crate::adapter::AdapterRegistry;
use crate::config::NodeDefaults;
use crate::node::{Node, NodeConfig, NodeSpec, NodeStatus, NodeUpdate};

/// Registered nodes in registration order.
///
/// The order is stable so that weighted selection walks nodes the same way
/// on every draw.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: Vec<Node>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a spec and adds a fresh node for it.
    ///
    /// Fails with `UnknownNodeKind` when no adapter serves the kind, and with
    /// `InvalidConfig` when a field is out of range.
    pub fn register(
        &mut self,
        spec: NodeSpec,
        adapters: &AdapterRegistry,
        defaults: NodeDefaults,
    ) -> Result<NodeId> {
        if !adapters.contains(&spec.kind) {
            return Err(DispatchError::UnknownNodeKind(spec.kind.to_string()));
        }

        let config = NodeConfig::from_spec(spec, defaults.max_tokens, defaults.timeout)?;
        let node = Node::new(config);
        let id = node.id;

        info!(
            "Registered node {} ({}, {}) as {}",
            node.config.name, node.config.kind, node.config.endpoint, id
        );
        self.nodes.push(node);
        Ok(id)
    }

    /// Hard-deletes a node. Returns false if it was not registered.
    pub fn remove(&mut self, id: NodeId) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|n| n.id != id);
        let removed = self.nodes.len() < before;
        if removed {
            info!("Removed node {}", id);
        }
        removed
    }

    /// Shallow-merges a patch into a node's configuration.
    ///
    /// Runtime state (load, health, counters) is untouched. Returns
    /// `Ok(false)` for an unknown id.
    pub fn update(&mut self, id: NodeId, update: NodeUpdate) -> Result<bool> {
        let Some(node) = self.get_mut(id) else {
            return Ok(false);
        };
        node.config = node.config.merged(update)?;
        info!("Updated node {} ({})", node.config.name, id);
        Ok(true)
    }

    pub fn list(&self) -> &[Node] {
        &self.nodes
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn count_with_status(&self, status: NodeStatus) -> usize {
        self.nodes.iter().filter(|n| n.status == status).count()
    }
}
