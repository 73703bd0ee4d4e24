use genmux_common::protocol::error::{DispatchError, Result};
use genmux_common::protocol::{generate_request_id, Completion, GenerationRequest, NodeId, RequestId};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::adapter::AdapterRegistry;
use crate::admission::{Admission, AdmissionController};
use crate::cluster::{ClusterState, ClusterStatus};
use crate::config::DispatcherConfig;
use crate::events::DispatchEvent;
use crate::health_checker::{HealthProber, ProbeSweep};
use crate::node::{NodeSpec, NodeSummary, NodeUpdate};
use crate::retry::run_with_retry;
use crate::selector::WeightedSelector;
use crate::tracker::Outcome;

/// Genmux dispatcher - routes generation requests across a backend pool.
///
/// Every submitted request goes through the same pipeline:
///
/// 1. **Admission**: at most `max_concurrent_requests` execute at once; the
///    rest wait in a FIFO queue
/// 2. **Selection**: weighted-random choice among active nodes below the load
///    ceiling, biased by health score
/// 3. **Execution**: the node kind's adapter performs the call, bounded by the
///    node's timeout
/// 4. **Tracking**: the outcome updates the node's health and the cluster
///    counters
/// 5. **Retry**: failures re-enter selection after a linear backoff until the
///    retry limit is reached
///
/// A background [`HealthProber`] probes every node on an interval and is the
/// only path by which an unhealthy node becomes active again.
///
/// # Example
/// ```no_run
/// # use genmux_dispatcher::{AdapterRegistry, Dispatcher, DispatcherConfig, NodeSpec};
/// # use genmux_common::protocol::GenerationRequest;
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dispatcher = Dispatcher::new(DispatcherConfig::default(), AdapterRegistry::with_defaults())?;
/// dispatcher
///     .register_node(NodeSpec::new("local", "ollama", "http://127.0.0.1:11434"))
///     .await?;
///
/// let completion = dispatcher.submit(GenerationRequest::user("Hello")).await?;
/// println!("{} answered: {}", completion.node_name, completion.text);
/// # Ok(())
/// # }
/// ```
pub struct Dispatcher {
    inner: Arc<Inner>,
    prober: HealthProber,
    /// Background prober task, aborted on shutdown
    prober_handle: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    config: DispatcherConfig,
    adapters: Arc<AdapterRegistry>,
    cluster: Arc<RwLock<ClusterState>>,
    admission: AdmissionController<PendingRequest>,
    events: broadcast::Sender<DispatchEvent>,
    closed: AtomicBool,
}

/// A submitted request waiting for, or holding, an execution slot.
struct PendingRequest {
    id: RequestId,
    request: GenerationRequest,
    submitted_at: Instant,
    reply: oneshot::Sender<Result<Completion>>,
}

/// A successful single attempt.
struct Served {
    node: NodeId,
    node_name: String,
    text: String,
    latency: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher with an entropy-seeded selector.
    ///
    /// Must be called within a Tokio runtime when health checks are enabled,
    /// since the prober task is spawned immediately.
    pub fn new(config: DispatcherConfig, adapters: AdapterRegistry) -> Result<Self> {
        Self::with_selector(config, adapters, WeightedSelector::new())
    }

    /// Creates a dispatcher with a caller-supplied selector, e.g. a seeded one.
    pub fn with_selector(
        config: DispatcherConfig,
        adapters: AdapterRegistry,
        selector: WeightedSelector,
    ) -> Result<Self> {
        config.validate()?;

        let adapters = Arc::new(adapters);
        let cluster = Arc::new(RwLock::new(ClusterState::new(selector)));
        let (events, _) = broadcast::channel(config.event_capacity);

        let prober = HealthProber::new(
            cluster.clone(),
            adapters.clone(),
            events.clone(),
            config.health.clone(),
        );
        let prober_handle = if config.health.enabled {
            Some(prober.clone().spawn())
        } else {
            None
        };

        info!(
            max_concurrent = config.max_concurrent_requests,
            retry_limit = config.retry.retry_limit,
            health_checks = config.health.enabled,
            kinds = ?adapters.kinds(),
            "Dispatcher initialized"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                admission: AdmissionController::new(config.max_concurrent_requests),
                config,
                adapters,
                cluster,
                events,
                closed: AtomicBool::new(false),
            }),
            prober,
            prober_handle: Mutex::new(prober_handle),
        })
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    /// Registers a node and returns its fresh id.
    ///
    /// Fails with `UnknownNodeKind` if no adapter serves the node's kind.
    pub async fn register_node(&self, spec: NodeSpec) -> Result<NodeId> {
        let name = spec.name.clone();
        let id = {
            let mut cluster = self.inner.cluster.write().await;
            cluster.registry.register(
                spec,
                &self.inner.adapters,
                self.inner.config.node_defaults(),
            )?
        };
        self.inner.emit(DispatchEvent::NodeRegistered { node: id, name });
        Ok(id)
    }

    /// Hard-deletes a node. In-flight attempts on it run to completion.
    pub async fn remove_node(&self, id: NodeId) -> bool {
        let removed = self.inner.cluster.write().await.registry.remove(id);
        if removed {
            self.inner.emit(DispatchEvent::NodeRemoved { node: id });
        }
        removed
    }

    /// Shallow-merges configuration changes into a node.
    ///
    /// Returns `Ok(false)` for an unknown id; runtime counters are kept.
    pub async fn update_node(&self, id: NodeId, update: NodeUpdate) -> Result<bool> {
        let updated = self.inner.cluster.write().await.registry.update(id, update)?;
        if updated {
            self.inner.emit(DispatchEvent::NodeUpdated { node: id });
        }
        Ok(updated)
    }

    /// Summaries of every registered node, in registration order.
    pub async fn nodes(&self) -> Vec<NodeSummary> {
        let cluster = self.inner.cluster.read().await;
        cluster.registry.list().iter().map(|n| n.summary()).collect()
    }

    pub async fn node(&self, id: NodeId) -> Option<NodeSummary> {
        let cluster = self.inner.cluster.read().await;
        cluster.registry.get(id).map(|n| n.summary())
    }

    /// Submits a request and returns a handle resolving to its final outcome.
    ///
    /// The request starts immediately when a slot is free, otherwise it waits
    /// behind earlier submissions. Failures surface only as `RetryExhausted`,
    /// or `Cancelled` if the dispatcher shuts down first.
    pub fn submit(&self, request: GenerationRequest) -> CompletionHandle {
        let (reply, receiver) = oneshot::channel();
        let id = generate_request_id();
        let handle = CompletionHandle {
            request_id: id,
            receiver,
        };

        if self.inner.closed.load(Ordering::Acquire) {
            let _ = reply.send(Err(DispatchError::Cancelled));
            return handle;
        }

        let pending = PendingRequest {
            id,
            request,
            submitted_at: Instant::now(),
            reply,
        };

        match self.inner.admission.admit(pending) {
            Admission::Start(pending) => Inner::start(self.inner.clone(), pending),
            Admission::Queued { position } => {
                debug!(request = id, position, "Request queued");
                self.inner.emit(DispatchEvent::RequestQueued { request: id, position });
            }
        }

        handle
    }

    pub async fn cluster_status(&self) -> ClusterStatus {
        let cluster = self.inner.cluster.read().await;
        cluster.status(self.inner.admission.queue_len(), self.inner.admission.active())
    }

    pub fn queue_length(&self) -> usize {
        self.inner.admission.queue_len()
    }

    pub fn active_requests(&self) -> usize {
        self.inner.admission.active()
    }

    /// Subscribes to lifecycle events from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.inner.events.subscribe()
    }

    /// Runs one probe sweep now, regardless of the background schedule.
    pub async fn probe_now(&self) -> ProbeSweep {
        self.prober.check_all_nodes().await
    }

    /// Stops the prober and cancels every queued request.
    ///
    /// Requests already executing run to completion.
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let handle = self
            .prober_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }

        let cancelled = self.inner.admission.drain_queue();
        if !cancelled.is_empty() {
            warn!("Dispatcher shut down with {} queued requests", cancelled.len());
        }
        for pending in cancelled {
            let _ = pending.reply.send(Err(DispatchError::Cancelled));
        }
        info!("Dispatcher shut down");
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    fn emit(&self, event: DispatchEvent) {
        // no subscribers is not an error
        let _ = self.events.send(event);
    }

    /// Spawns execution of a request that already holds a slot.
    ///
    /// On completion the slot passes to the oldest queued request before the
    /// caller is notified.
    fn start(inner: Arc<Inner>, pending: PendingRequest) {
        inner.emit(DispatchEvent::RequestStarted { request: pending.id });
        tokio::spawn(async move {
            let slot = SlotGuard {
                inner: inner.clone(),
            };
            let result = inner.execute(&pending).await;
            drop(slot);

            let _ = pending.reply.send(result);
        });
    }

    /// Runs the retry loop around select, execute and record.
    async fn execute(&self, pending: &PendingRequest) -> Result<Completion> {
        let inner = self;
        let request = &pending.request;
        let id = pending.id;

        debug!(
            request = id,
            waited_ms = pending.submitted_at.elapsed().as_millis() as u64,
            "Request started"
        );

        let outcome = run_with_retry(
            &self.config.retry,
            move |_| inner.attempt(request),
            move |attempt, error| {
                inner.emit(DispatchEvent::AttemptFailed {
                    request: id,
                    attempt,
                    error: error.to_string(),
                })
            },
        )
        .await;

        match outcome {
            Ok(retried) => {
                let served = retried.value;
                info!(
                    request = id,
                    node = %served.node,
                    latency_ms = served.latency.as_millis() as u64,
                    attempts = retried.attempts,
                    "Request served by {}",
                    served.node_name
                );
                self.emit(DispatchEvent::RequestCompleted {
                    request: id,
                    served_by: served.node,
                    latency: served.latency,
                    attempts: retried.attempts,
                });
                Ok(Completion {
                    request_id: id,
                    text: served.text,
                    served_by: served.node,
                    node_name: served.node_name,
                    latency: served.latency,
                    attempts: retried.attempts,
                })
            }
            Err(error) => {
                let attempts = error.attempts().unwrap_or(0);
                warn!(request = id, attempts, "Request failed: {}", error);
                self.emit(DispatchEvent::RequestFailed {
                    request: id,
                    attempts,
                    error: error
                        .last_error()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| error.to_string()),
                });
                Err(error)
            }
        }
    }

    /// One pass through selection, the adapter call and outcome recording.
    async fn attempt(&self, request: &GenerationRequest) -> Result<Served> {
        let (node, config) = {
            let mut cluster = self.cluster.write().await;
            cluster.acquire(self.config.node_load_ceiling)?
        };
        let load = LoadGuard {
            cluster: self.cluster.clone(),
            node,
            started: Instant::now(),
            armed: true,
        };

        let started = load.started;
        let result = match self.adapters.get(&config.kind) {
            Some(adapter) => {
                match tokio::time::timeout(config.timeout, adapter.execute(&config, request, config.timeout)).await {
                    Ok(result) => result,
                    Err(_) => Err(DispatchError::NodeTimeout(config.timeout.as_millis() as u64)),
                }
            }
            None => Err(DispatchError::UnknownNodeKind(config.kind.to_string())),
        };
        let latency = started.elapsed();
        load.disarm();

        let change = {
            let mut cluster = self.cluster.write().await;
            cluster.record(node, Outcome::traffic(result.is_ok(), latency))
        };
        if let Some(change) = change {
            self.emit(DispatchEvent::NodeStatusChanged {
                node: change.node,
                from: change.from,
                to: change.to,
            });
        }

        result.map(|text| Served {
            node,
            node_name: config.name,
            text,
            latency,
        })
    }
}

/// Holds one admission slot for a running request.
///
/// Dropping it frees the slot and starts the oldest queued request, also when
/// the request's task unwinds.
struct SlotGuard {
    inner: Arc<Inner>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let Some(next) = self.inner.admission.release() else {
            return;
        };
        if tokio::runtime::Handle::try_current().is_ok() {
            Inner::start(self.inner.clone(), next);
        }
        // without a runtime the request is dropped and its caller sees Cancelled
    }
}

/// Unit of node load reserved by [`ClusterState::acquire`].
///
/// Unless disarmed after the outcome is recorded normally, dropping it records
/// a failed traffic attempt so the load is returned.
struct LoadGuard {
    cluster: Arc<RwLock<ClusterState>>,
    node: NodeId,
    started: Instant,
    armed: bool,
}

impl LoadGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let outcome = Outcome::traffic(false, self.started.elapsed());
        warn!(node = %self.node, "Attempt abandoned, releasing node load");

        if let Ok(mut cluster) = self.cluster.try_write() {
            cluster.record(self.node, outcome);
            return;
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let cluster = self.cluster.clone();
            let node = self.node;
            handle.spawn(async move {
                cluster.write().await.record(node, outcome);
            });
        }
    }
}

/// Resolves to the final outcome of a submitted request.
///
/// Dropping the handle does not cancel the request.
#[derive(Debug)]
pub struct CompletionHandle {
    request_id: RequestId,
    receiver: oneshot::Receiver<Result<Completion>>,
}

impl CompletionHandle {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }
}

impl Future for CompletionHandle {
    type Output = Result<Completion>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(DispatchError::Cancelled)))
    }
}
