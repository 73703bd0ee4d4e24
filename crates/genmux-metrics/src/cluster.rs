use crate::snapshot::{epoch_ms, ClusterStatsSnapshot};
use std::time::{Duration, Instant, SystemTime};

/// Process-wide dispatch counters.
///
/// Counts every traffic attempt that reached a node. The average response
/// time is maintained incrementally over successful attempts only, so it is
/// never skewed by timeouts. Reset only by restarting the process.
#[derive(Debug, Clone)]
pub struct ClusterStats {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    avg_response_time_ms: f64,
    last_health_check: Option<SystemTime>,
    started_at: Instant,
}

impl ClusterStats {
    pub fn new() -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            avg_response_time_ms: 0.0,
            last_health_check: None,
            started_at: Instant::now(),
        }
    }

    /// Records the outcome of one attempt.
    pub fn record(&mut self, success: bool, latency: Duration) {
        self.total_requests += 1;

        if success {
            self.successful_requests += 1;
            let latency_ms = latency.as_secs_f64() * 1000.0;
            self.avg_response_time_ms +=
                (latency_ms - self.avg_response_time_ms) / self.successful_requests as f64;
        } else {
            self.failed_requests += 1;
        }
    }

    /// Stamps the completion time of a health-probe sweep.
    pub fn mark_health_check(&mut self, at: SystemTime) {
        self.last_health_check = Some(at);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    pub fn successful_requests(&self) -> u64 {
        self.successful_requests
    }

    pub fn failed_requests(&self) -> u64 {
        self.failed_requests
    }

    pub fn avg_response_time_ms(&self) -> f64 {
        self.avg_response_time_ms
    }

    pub fn last_health_check(&self) -> Option<SystemTime> {
        self.last_health_check
    }

    pub fn snapshot(&self) -> ClusterStatsSnapshot {
        ClusterStatsSnapshot {
            total_requests: self.total_requests,
            successful_requests: self.successful_requests,
            failed_requests: self.failed_requests,
            avg_response_time_ms: self.avg_response_time_ms,
            last_health_check_ms: self.last_health_check.map(epoch_ms),
            uptime_ms: self.started_at.elapsed().as_millis() as u64,
        }
    }
}

impl Default for ClusterStats {
    fn default() -> Self {
        Self::new()
    }
}
