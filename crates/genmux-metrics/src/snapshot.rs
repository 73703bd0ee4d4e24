// Copyright 2025 Genmux Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::health::NodeHealth;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Milliseconds since the Unix epoch, or 0 for times before it.
pub fn epoch_ms(at: SystemTime) -> u64 {
    at.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Aggregate dispatch statistics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterStatsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub avg_response_time_ms: f64,
    pub last_health_check_ms: Option<u64>,
    pub uptime_ms: u64,
}

/// Latency and counter view of one node's health
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthSnapshot {
    pub health_score: u8,
    pub success_count: u64,
    pub error_count: f64,
    pub samples: usize,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
}

impl HealthSnapshot {
    pub fn from_health(health: &NodeHealth) -> Self {
        let latencies = health.latencies();
        Self {
            health_score: health.score(),
            success_count: health.success_count(),
            error_count: health.error_count(),
            samples: latencies.len(),
            avg_latency_ms: latencies.avg_ms(),
            p50_latency_ms: latencies.percentile(50).as_millis() as u64,
            p95_latency_ms: latencies.percentile(95).as_millis() as u64,
        }
    }
}
