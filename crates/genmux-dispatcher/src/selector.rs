use genmux_common::protocol::error::{DispatchError, Result};
use genmux_common::protocol::NodeId;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use crate::node::Node;

/// Weighted-random node selector biased by health.
///
/// Each eligible node contributes `weight * health_score / 100` of
/// probability mass. The random source is owned by the selector and can be
/// replaced with a seeded generator to make draws reproducible.
pub struct WeightedSelector {
    rng: Box<dyn RngCore + Send + Sync>,
}

impl WeightedSelector {
    /// Selector drawing from OS-seeded randomness.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng<R>(rng: R) -> Self
    where
        R: RngCore + Send + Sync + 'static,
    {
        Self { rng: Box::new(rng) }
    }

    /// Deterministic selector for reproducible draws.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    /// Picks one node among those active and below `load_ceiling`.
    ///
    /// Walks the eligible nodes in slice order, subtracting each effective
    /// weight from a uniform draw in `[0, total)`; the first node that brings
    /// the remainder to zero or below wins.
    pub fn select(&mut self, nodes: &[Node], load_ceiling: u32) -> Result<NodeId> {
        let eligible: Vec<(&Node, f64)> = nodes
            .iter()
            .filter(|n| n.is_eligible(load_ceiling))
            .map(|n| (n, n.effective_weight()))
            .collect();

        let total: f64 = eligible.iter().map(|(_, w)| w).sum();
        if eligible.is_empty() || total <= 0.0 || !total.is_finite() {
            return Err(DispatchError::NoAvailableNode);
        }

        let mut remainder = self.rng.gen::<f64>() * total;
        for (node, weight) in &eligible {
            remainder -= weight;
            if remainder <= 0.0 {
                return Ok(node.id);
            }
        }

        // float rounding can leave a sliver past the last node
        eligible
            .last()
            .map(|(node, _)| node.id)
            .ok_or(DispatchError::NoAvailableNode)
    }
}

impl Default for WeightedSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WeightedSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeightedSelector").finish_non_exhaustive()
    }
}
