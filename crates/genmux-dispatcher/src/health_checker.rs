use genmux_common::protocol::error::{DispatchError, Result};
use genmux_common::protocol::NodeId;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{broadcast, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::adapter::AdapterRegistry;
use crate::cluster::ClusterState;
use crate::events::DispatchEvent;
use crate::node::{NodeConfig, NodeStatus};
use crate::tracker::{Outcome, StatusChange};

/// Health check configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckConfig {
    pub interval: Duration,
    pub timeout: Duration,
    /// When false the background loop is never spawned; on-demand sweeps
    /// still work
    pub enabled: bool,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            enabled: true,
        }
    }
}

/// Outcome of one probe against one node.
struct ProbeResult {
    node: NodeId,
    name: String,
    result: Result<()>,
    latency: Duration,
}

/// Summary of a completed sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProbeSweep {
    pub probed: usize,
    pub failed: usize,
    pub active: usize,
    pub unhealthy: usize,
}

/// Background liveness prober.
///
/// Probes every registered node on a fixed interval, independently of live
/// traffic. It is the only path by which an unhealthy node returns to
/// active.
#[derive(Clone)]
pub struct HealthProber {
    cluster: Arc<RwLock<ClusterState>>,
    adapters: Arc<AdapterRegistry>,
    events: broadcast::Sender<DispatchEvent>,
    config: HealthCheckConfig,
}

impl HealthProber {
    pub fn new(
        cluster: Arc<RwLock<ClusterState>>,
        adapters: Arc<AdapterRegistry>,
        events: broadcast::Sender<DispatchEvent>,
        config: HealthCheckConfig,
    ) -> Self {
        Self {
            cluster,
            adapters,
            events,
            config,
        }
    }

    /// Starts the prober task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Main probe loop; the first sweep runs one interval after start.
    async fn run(self) {
        let mut interval =
            tokio::time::interval_at(Instant::now() + self.config.interval, self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            self.check_all_nodes().await;
        }
    }

    /// Probes every node in parallel and applies the results.
    pub async fn check_all_nodes(&self) -> ProbeSweep {
        let nodes: Vec<(NodeId, NodeConfig)> = {
            let cluster = self.cluster.read().await;
            cluster
                .registry
                .list()
                .iter()
                .map(|n| (n.id, n.config.clone()))
                .collect()
        };

        let checks: Vec<_> = nodes
            .into_iter()
            .map(|(id, config)| {
                let adapters = &self.adapters;
                let timeout = self.config.timeout;
                async move {
                    let started = Instant::now();
                    let result = Self::probe_node(adapters, &config, timeout).await;
                    ProbeResult {
                        node: id,
                        name: config.name,
                        result,
                        latency: started.elapsed(),
                    }
                }
            })
            .collect();

        let results = futures::future::join_all(checks).await;
        self.apply_results(results).await
    }

    /// Probes a single node, bounded by the probe timeout.
    async fn probe_node(
        adapters: &AdapterRegistry,
        config: &NodeConfig,
        timeout: Duration,
    ) -> Result<()> {
        let adapter = adapters
            .get(&config.kind)
            .ok_or_else(|| DispatchError::UnknownNodeKind(config.kind.to_string()))?;

        tokio::time::timeout(timeout, adapter.probe(config, timeout))
            .await
            .map_err(|_| DispatchError::NodeTimeout(timeout.as_millis() as u64))?
    }

    /// Applies a sweep's results under a single write lock.
    async fn apply_results(&self, results: Vec<ProbeResult>) -> ProbeSweep {
        let mut changes = Vec::new();
        let mut sweep = ProbeSweep {
            probed: results.len(),
            ..Default::default()
        };

        let mut cluster = self.cluster.write().await;
        for probe in results {
            let success = probe.result.is_ok();
            if let Err(e) = &probe.result {
                sweep.failed += 1;
                debug!("Probe of node {} ({}) failed: {}", probe.name, probe.node, e);
            }

            // removed while the probe was in flight
            if cluster.registry.get(probe.node).is_none() {
                continue;
            }

            if let Some(change) = cluster.record(probe.node, Outcome::probe(success, probe.latency)) {
                changes.push(change);
            }

            let Some(node) = cluster.registry.get_mut(probe.node) else {
                continue;
            };
            match (success, node.status) {
                (true, NodeStatus::Unhealthy) if !node.health.is_unhealthy() => {
                    node.status = NodeStatus::Active;
                    info!(
                        "Node {} ({}) restored after successful probe, health score {}",
                        node.config.name,
                        node.id,
                        node.health_score()
                    );
                    changes.push(StatusChange {
                        node: node.id,
                        from: NodeStatus::Unhealthy,
                        to: NodeStatus::Active,
                    });
                }
                (false, NodeStatus::Active) => {
                    node.status = NodeStatus::Unhealthy;
                    warn!(
                        "Node {} ({}) marked unhealthy after failed probe",
                        node.config.name, node.id
                    );
                    changes.push(StatusChange {
                        node: node.id,
                        from: NodeStatus::Active,
                        to: NodeStatus::Unhealthy,
                    });
                }
                _ => {}
            }
        }

        cluster.stats.mark_health_check(SystemTime::now());
        sweep.active = cluster.registry.count_with_status(NodeStatus::Active);
        sweep.unhealthy = cluster.registry.count_with_status(NodeStatus::Unhealthy);
        drop(cluster);

        for change in changes {
            let _ = self.events.send(DispatchEvent::NodeStatusChanged {
                node: change.node,
                from: change.from,
                to: change.to,
            });
        }
        let _ = self.events.send(DispatchEvent::ProbeSweepCompleted {
            active: sweep.active,
            unhealthy: sweep.unhealthy,
        });

        info!(
            "Probe sweep completed: {} probed, {} failed, {} active, {} unhealthy",
            sweep.probed, sweep.failed, sweep.active, sweep.unhealthy
        );
        sweep
    }
}
