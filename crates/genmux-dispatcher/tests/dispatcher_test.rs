//! Dispatcher Integration Tests
//!
//! Exercises the full submit pipeline (admission, selection, execution,
//! tracking, retry) against in-process adapters, with Tokio's paused clock
//! standing in for slow backends.

use async_trait::async_trait;
use genmux_common::protocol::{DispatchError, GenerationRequest, NodeId, Result};
use genmux_dispatcher::{
    AdapterRegistry, ClusterState, DispatchEvent, Dispatcher, DispatcherConfig, ExecutionAdapter,
    HealthCheckConfig, NodeConfig, NodeDefaults, NodeSpec, NodeStatus, NodeUpdate, Outcome,
    RetryConfig, WeightedSelector,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// Scripted adapters
// ============================================================================

/// Answers with the serving node's name.
struct NameEcho;

#[async_trait]
impl ExecutionAdapter for NameEcho {
    async fn execute(
        &self,
        node: &NodeConfig,
        _request: &GenerationRequest,
        _timeout: Duration,
    ) -> Result<String> {
        Ok(node.name.clone())
    }
}

/// Never answers; every call ends in the dispatcher's timeout.
struct Hang;

#[async_trait]
impl ExecutionAdapter for Hang {
    async fn execute(
        &self,
        _node: &NodeConfig,
        _request: &GenerationRequest,
        _timeout: Duration,
    ) -> Result<String> {
        std::future::pending().await
    }

    async fn probe(&self, _node: &NodeConfig, _timeout: Duration) -> Result<()> {
        std::future::pending().await
    }
}

/// Fails immediately and records when each call happened.
#[derive(Clone, Default)]
struct AlwaysFail {
    calls: Arc<Mutex<Vec<Instant>>>,
}

#[async_trait]
impl ExecutionAdapter for AlwaysFail {
    async fn execute(
        &self,
        _node: &NodeConfig,
        _request: &GenerationRequest,
        _timeout: Duration,
    ) -> Result<String> {
        self.calls.lock().unwrap().push(Instant::now());
        Err(DispatchError::NodeApi {
            status: 500,
            body: "internal error".into(),
        })
    }
}

/// Takes a fixed time per call, tracking start order and peak concurrency.
#[derive(Clone)]
struct Slow {
    delay: Duration,
    started: Arc<Mutex<Vec<String>>>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Slow {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: Arc::new(Mutex::new(Vec::new())),
            running: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl ExecutionAdapter for Slow {
    async fn execute(
        &self,
        _node: &NodeConfig,
        request: &GenerationRequest,
        _timeout: Duration,
    ) -> Result<String> {
        let prompt = request.messages[0].content.clone();
        self.started.lock().unwrap().push(prompt.clone());
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(prompt)
    }
}

/// Availability flipped by the test. While down, calls stall past any
/// timeout and probes fail.
struct Switch(Arc<AtomicBool>);

#[async_trait]
impl ExecutionAdapter for Switch {
    async fn execute(
        &self,
        _node: &NodeConfig,
        _request: &GenerationRequest,
        _timeout: Duration,
    ) -> Result<String> {
        if self.0.load(Ordering::SeqCst) {
            Ok("up".into())
        } else {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("late".into())
        }
    }

    async fn probe(&self, _node: &NodeConfig, _timeout: Duration) -> Result<()> {
        if self.0.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DispatchError::Transport("connection refused".into()))
        }
    }
}

/// Panics on its first call, then answers normally.
#[derive(Default)]
struct PanicOnce {
    tripped: AtomicBool,
}

#[async_trait]
impl ExecutionAdapter for PanicOnce {
    async fn execute(
        &self,
        _node: &NodeConfig,
        request: &GenerationRequest,
        _timeout: Duration,
    ) -> Result<String> {
        if !self.tripped.swap(true, Ordering::SeqCst) {
            panic!("adapter blew up");
        }
        Ok(request.messages[0].content.clone())
    }
}

fn config() -> DispatcherConfig {
    DispatcherConfig::default().without_health_checks()
}

fn dispatcher(config: DispatcherConfig, adapters: AdapterRegistry) -> Dispatcher {
    Dispatcher::with_selector(config, adapters, WeightedSelector::seeded(0xC0FFEE)).unwrap()
}

fn spec(name: &str, kind: &str) -> NodeSpec {
    NodeSpec::new(name, kind, format!("mem://{}", name))
}

// ============================================================================
// Selection
// ============================================================================

#[tokio::test]
async fn test_weighted_selection_distribution() {
    let dispatcher = dispatcher(config(), AdapterRegistry::new().with("instant", NameEcho));
    let x = dispatcher.register_node(spec("x", "instant").with_weight(1.0)).await.unwrap();
    let y = dispatcher.register_node(spec("y", "instant").with_weight(3.0)).await.unwrap();

    let mut served: HashMap<NodeId, usize> = HashMap::new();
    for i in 0..10_000 {
        let completion = dispatcher
            .submit(GenerationRequest::user(format!("r{}", i)))
            .await
            .unwrap();
        *served.entry(completion.served_by).or_default() += 1;
    }

    let y_share = served[&y] as f64 / 10_000.0;
    assert!((0.70..=0.80).contains(&y_share), "y share was {}", y_share);
    assert_eq!(served[&x] + served[&y], 10_000);
}

#[test]
fn test_selection_converges_to_weight_ratio() {
    let adapters = AdapterRegistry::new().with("instant", NameEcho);
    let mut state = ClusterState::new(WeightedSelector::seeded(17));
    let a = state
        .registry
        .register(spec("a", "instant").with_weight(2.0), &adapters, NodeDefaults::default())
        .unwrap();
    state
        .registry
        .register(spec("b", "instant").with_weight(5.0), &adapters, NodeDefaults::default())
        .unwrap();

    let mut a_count = 0;
    for _ in 0..10_000 {
        let (id, _) = state.acquire(1).unwrap();
        if id == a {
            a_count += 1;
        }
        state.record(id, Outcome::traffic(true, Duration::ZERO));
    }

    let expected = 2.0 / 7.0;
    let share = a_count as f64 / 10_000.0;
    assert!((share - expected).abs() < 0.02, "share was {}", share);
}

#[test]
fn test_unhealthy_node_excluded_after_five_failures() {
    let adapters = AdapterRegistry::new().with("instant", NameEcho);
    let mut state = ClusterState::new(WeightedSelector::seeded(3));
    let z = state
        .registry
        .register(spec("z", "instant"), &adapters, NodeDefaults::default())
        .unwrap();
    let w = state
        .registry
        .register(spec("w", "instant"), &adapters, NodeDefaults::default())
        .unwrap();

    for _ in 0..5 {
        state.registry.get_mut(z).unwrap().current_load += 1;
        state.record(z, Outcome::traffic(false, Duration::from_secs(3)));
    }

    let node = state.registry.get(z).unwrap();
    assert!(node.health_score() < 30, "score was {}", node.health_score());
    assert_eq!(node.status, NodeStatus::Unhealthy);
    assert_eq!(state.registry.len(), 2);

    for _ in 0..1_000 {
        let (id, _) = state.acquire(1).unwrap();
        assert_eq!(id, w);
        state.record(id, Outcome::traffic(true, Duration::ZERO));
    }
}

#[tokio::test(start_paused = true)]
async fn test_timing_out_node_stops_receiving_traffic() {
    let adapters = AdapterRegistry::new()
        .with("hang", Hang)
        .with("instant", NameEcho);
    let dispatcher = dispatcher(config(), adapters);
    let z = dispatcher
        .register_node(spec("z", "hang").with_timeout(Duration::from_secs(4)))
        .await
        .unwrap();
    let ok = dispatcher.register_node(spec("ok", "instant")).await.unwrap();

    for i in 0..50 {
        let completion = dispatcher
            .submit(GenerationRequest::user(format!("r{}", i)))
            .await
            .unwrap();
        assert_eq!(completion.served_by, ok);
    }

    let z_summary = dispatcher.node(z).await.unwrap();
    assert_eq!(z_summary.status, NodeStatus::Unhealthy);
    assert!(z_summary.health.health_score < 30);
    assert_eq!(z_summary.current_load, 0);
}

// ============================================================================
// Admission
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_admission_ceiling_and_fifo_start_order() {
    let slow = Slow::new(Duration::from_millis(100));
    let dispatcher = dispatcher(
        config().with_max_concurrent_requests(2).with_node_load_ceiling(10),
        AdapterRegistry::new().with("slow", slow.clone()),
    );
    dispatcher.register_node(spec("s", "slow")).await.unwrap();
    let mut events = dispatcher.subscribe();

    let handles: Vec<_> = (0..5)
        .map(|i| dispatcher.submit(GenerationRequest::user(format!("req{}", i))))
        .collect();

    assert_eq!(dispatcher.active_requests(), 2);
    assert_eq!(dispatcher.queue_length(), 3);
    let status = dispatcher.cluster_status().await;
    assert_eq!(status.active_requests, 2);
    assert_eq!(status.queue_length, 3);

    let started = Instant::now();
    let results = futures::future::join_all(handles).await;
    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap().text, format!("req{}", i));
    }

    assert_eq!(slow.peak.load(Ordering::SeqCst), 2);
    assert_eq!(
        *slow.started.lock().unwrap(),
        vec!["req0", "req1", "req2", "req3", "req4"]
    );
    // three waves of 100ms
    assert_eq!(started.elapsed(), Duration::from_millis(300));
    assert_eq!(dispatcher.active_requests(), 0);

    let mut queued_positions = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let DispatchEvent::RequestQueued { position, .. } = event {
            queued_positions.push(position);
        }
    }
    assert_eq!(queued_positions, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_panicking_adapter_releases_slot_and_load() {
    let dispatcher = dispatcher(
        config().with_max_concurrent_requests(1),
        AdapterRegistry::new().with("flaky", PanicOnce::default()),
    );
    let id = dispatcher.register_node(spec("f", "flaky")).await.unwrap();

    let first = dispatcher.submit(GenerationRequest::user("first"));
    let second = dispatcher.submit(GenerationRequest::user("second"));
    assert_eq!(dispatcher.queue_length(), 1);

    assert!(matches!(first.await, Err(DispatchError::Cancelled)));

    // the queued request takes over the freed slot
    let completion = tokio::time::timeout(Duration::from_secs(2), second)
        .await
        .expect("queued request never started")
        .unwrap();
    assert_eq!(completion.text, "second");
    assert_eq!(completion.served_by, id);

    let status = dispatcher.cluster_status().await;
    assert_eq!(status.active_requests, 0);
    assert_eq!(status.queue_length, 0);
    assert_eq!(status.nodes[0].current_load, 0);
    // the abandoned attempt counts as a failure
    assert_eq!(status.stats.total_requests, 2);
    assert_eq!(status.stats.failed_requests, 1);

    let third = dispatcher.submit(GenerationRequest::user("third")).await.unwrap();
    assert_eq!(third.text, "third");
}

#[tokio::test(start_paused = true)]
async fn test_active_requests_never_exceed_ceiling() {
    let slow = Slow::new(Duration::from_millis(30));
    let dispatcher = dispatcher(
        config().with_max_concurrent_requests(3).with_node_load_ceiling(100),
        AdapterRegistry::new().with("slow", slow.clone()),
    );
    dispatcher.register_node(spec("s", "slow")).await.unwrap();

    let handles: Vec<_> = (0..40)
        .map(|i| dispatcher.submit(GenerationRequest::user(format!("{}", i))))
        .collect();
    let watcher = async {
        for _ in 0..100 {
            assert!(dispatcher.active_requests() <= 3);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    let (results, _) = tokio::join!(futures::future::join_all(handles), watcher);

    assert!(results.iter().all(|r| r.is_ok()));
    assert!(slow.peak.load(Ordering::SeqCst) <= 3);
}

// ============================================================================
// Retry
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_always_failing_node_exhausts_retries_with_growing_delay() {
    let failing = AlwaysFail::default();
    let dispatcher = dispatcher(config(), AdapterRegistry::new().with("fail", failing.clone()));
    dispatcher.register_node(spec("f", "fail")).await.unwrap();

    let err = dispatcher
        .submit(GenerationRequest::user("hello"))
        .await
        .unwrap_err();

    assert_eq!(err.attempts(), Some(3));
    assert!(matches!(
        err.last_error(),
        Some(DispatchError::NodeApi { status: 500, .. })
    ));

    let calls = failing.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 3);
    let first_gap = calls[1] - calls[0];
    let second_gap = calls[2] - calls[1];
    assert_eq!(first_gap, Duration::from_secs(1));
    assert_eq!(second_gap, Duration::from_secs(2));
    assert!(second_gap > first_gap);

    let status = dispatcher.cluster_status().await;
    assert_eq!(status.stats.total_requests, 3);
    assert_eq!(status.stats.failed_requests, 3);
}

#[tokio::test(start_paused = true)]
async fn test_rejection_attempts_match_retry_limit() {
    let dispatcher = dispatcher(
        config().with_retry(RetryConfig::new(5, Duration::from_millis(10))),
        AdapterRegistry::new().with("fail", AlwaysFail::default()),
    );
    dispatcher.register_node(spec("f", "fail")).await.unwrap();

    let err = dispatcher.submit(GenerationRequest::user("x")).await.unwrap_err();
    assert_eq!(err.attempts(), Some(5));
}

#[tokio::test(start_paused = true)]
async fn test_all_nodes_unhealthy_rejects_with_no_available_node() {
    let dispatcher = dispatcher(config(), AdapterRegistry::new().with("hang", Hang));
    for name in ["a", "b"] {
        dispatcher
            .register_node(spec(name, "hang").with_timeout(Duration::from_secs(4)))
            .await
            .unwrap();
    }

    // the first request drives both nodes unhealthy through timeouts
    let first = dispatcher.submit(GenerationRequest::user("one")).await.unwrap_err();
    assert_eq!(first.attempts(), Some(3));
    let status = dispatcher.cluster_status().await;
    assert_eq!(status.unhealthy_nodes, 2);
    assert_eq!(status.active_nodes, 0);

    let started = Instant::now();
    let err = dispatcher.submit(GenerationRequest::user("two")).await.unwrap_err();
    assert!(matches!(err, DispatchError::RetryExhausted { attempts: 3, .. }));
    assert!(matches!(err.last_error(), Some(DispatchError::NoAvailableNode)));
    // only the backoff delays elapse
    assert_eq!(started.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_failover_to_another_node() {
    let dispatcher = dispatcher(
        config(),
        AdapterRegistry::new()
            .with("hang", Hang)
            .with("instant", NameEcho),
    );
    dispatcher
        .register_node(spec("bad", "hang").with_timeout(Duration::from_secs(4)))
        .await
        .unwrap();
    let good = dispatcher.register_node(spec("good", "instant")).await.unwrap();

    for i in 0..20 {
        let completion = dispatcher
            .submit(GenerationRequest::user(format!("{}", i)))
            .await
            .unwrap();
        assert_eq!(completion.served_by, good);
        assert!(completion.attempts <= 2);
    }
}

// ============================================================================
// Node lifecycle
// ============================================================================

#[tokio::test]
async fn test_update_keeps_counters() {
    let dispatcher = dispatcher(config(), AdapterRegistry::new().with("instant", NameEcho));
    let id = dispatcher.register_node(spec("n", "instant")).await.unwrap();
    dispatcher.submit(GenerationRequest::user("a")).await.unwrap();
    dispatcher.submit(GenerationRequest::user("b")).await.unwrap();

    let updated = dispatcher
        .update_node(
            id,
            NodeUpdate {
                name: Some("renamed".into()),
                weight: Some(2.5),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(updated);

    let summary = dispatcher.node(id).await.unwrap();
    assert_eq!(summary.name, "renamed");
    assert_eq!(summary.weight, 2.5);
    assert_eq!(summary.health.success_count, 2);
    assert_eq!(summary.health.samples, 2);

    assert!(!dispatcher
        .update_node(NodeId::new(), NodeUpdate::default())
        .await
        .unwrap());
    assert!(dispatcher
        .update_node(
            id,
            NodeUpdate {
                timeout_ms: Some(0),
                ..Default::default()
            }
        )
        .await
        .is_err());
}

#[tokio::test(start_paused = true)]
async fn test_probe_restores_unhealthy_node() {
    let up = Arc::new(AtomicBool::new(false));
    let dispatcher = dispatcher(config(), AdapterRegistry::new().with("switch", Switch(up.clone())));
    let id = dispatcher
        .register_node(spec("s", "switch").with_timeout(Duration::from_secs(5)))
        .await
        .unwrap();

    // a 5s timeout scores 20 and demotes the node
    let err = dispatcher.submit(GenerationRequest::user("x")).await.unwrap_err();
    assert!(err.attempts().is_some());
    assert_eq!(dispatcher.node(id).await.unwrap().status, NodeStatus::Unhealthy);

    up.store(true, Ordering::SeqCst);
    for _ in 0..10 {
        dispatcher.probe_now().await;
        if dispatcher.node(id).await.unwrap().status == NodeStatus::Active {
            break;
        }
    }
    assert_eq!(dispatcher.node(id).await.unwrap().status, NodeStatus::Active);
    assert!(dispatcher.cluster_status().await.stats.last_health_check_ms.is_some());

    let completion = dispatcher.submit(GenerationRequest::user("y")).await.unwrap();
    assert_eq!(completion.text, "up");
}

#[tokio::test(start_paused = true)]
async fn test_background_prober_runs_on_interval() {
    let config = DispatcherConfig::default().with_health(HealthCheckConfig {
        interval: Duration::from_secs(10),
        timeout: Duration::from_secs(1),
        enabled: true,
    });
    let dispatcher = dispatcher(config, AdapterRegistry::new().with("hang", Hang));
    let id = dispatcher.register_node(spec("h", "hang")).await.unwrap();
    let mut events = dispatcher.subscribe();

    tokio::time::sleep(Duration::from_secs(12)).await;

    assert_eq!(dispatcher.node(id).await.unwrap().status, NodeStatus::Unhealthy);
    let mut sweeps = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, DispatchEvent::ProbeSweepCompleted { .. }) {
            sweeps += 1;
        }
    }
    assert_eq!(sweeps, 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_queued_requests() {
    let dispatcher = dispatcher(
        config().with_max_concurrent_requests(1),
        AdapterRegistry::new().with("slow", Slow::new(Duration::from_secs(1))),
    );
    dispatcher.register_node(spec("s", "slow")).await.unwrap();

    let running = dispatcher.submit(GenerationRequest::user("first"));
    let queued = dispatcher.submit(GenerationRequest::user("second"));
    assert_eq!(dispatcher.queue_length(), 1);

    dispatcher.shutdown();

    assert!(matches!(queued.await, Err(DispatchError::Cancelled)));
    assert_eq!(running.await.unwrap().text, "first");
}
