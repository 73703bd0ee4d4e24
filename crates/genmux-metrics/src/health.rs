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

use crate::window::LatencyWindow;
use std::time::Duration;

/// Score a freshly registered node starts with.
pub const INITIAL_HEALTH_SCORE: u8 = 100;

/// Nodes scoring strictly below this are considered unhealthy.
pub const UNHEALTHY_THRESHOLD: u8 = 30;

/// Average latency at which the latency component of the score reaches zero.
pub const LATENCY_CEILING_MS: f64 = 10_000.0;

const SUCCESS_WEIGHT: f64 = 60.0;
const LATENCY_WEIGHT: f64 = 40.0;
const ERROR_DECAY: f64 = 0.5;

/// Health bookkeeping for a single backend node.
///
/// Every execution outcome (live traffic or probe) is fed through
/// [`record`](Self::record), which appends the latency sample, adjusts the
/// success/error counters and recomputes the 0-100 score:
///
/// ```text
/// score = round(success_rate * 60 + max(0, 1 - avg_latency_ms / 10000) * 40)
/// success_rate = successes / (successes + errors)
/// ```
///
/// Errors decay by 0.5 on every success (floored at zero) so that a node
/// with a burst of old failures recovers as it keeps succeeding.
///
/// # Example
///
/// ```rust
/// use genmux_metrics::{NodeHealth, UNHEALTHY_THRESHOLD};
/// use std::time::Duration;
///
/// let mut health = NodeHealth::new();
/// assert_eq!(health.score(), 100);
///
/// health.record(false, Duration::from_secs(8));
/// assert!(health.score() < UNHEALTHY_THRESHOLD);
/// ```
#[derive(Debug, Clone)]
pub struct NodeHealth {
    latencies: LatencyWindow,
    success_count: u64,
    error_count: f64,
    score: u8,
}

impl NodeHealth {
    pub fn new() -> Self {
        Self {
            latencies: LatencyWindow::new(),
            success_count: 0,
            error_count: 0.0,
            score: INITIAL_HEALTH_SCORE,
        }
    }

    /// Records one outcome and returns the recomputed score.
    pub fn record(&mut self, success: bool, latency: Duration) -> u8 {
        self.latencies.push(latency);

        if success {
            self.success_count += 1;
            self.error_count = (self.error_count - ERROR_DECAY).max(0.0);
        } else {
            self.error_count += 1.0;
        }

        self.score = compute_score(
            self.success_count,
            self.error_count,
            self.latencies.avg_ms(),
        );
        self.score
    }

    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn is_unhealthy(&self) -> bool {
        self.score < UNHEALTHY_THRESHOLD
    }

    pub fn success_count(&self) -> u64 {
        self.success_count
    }

    pub fn error_count(&self) -> f64 {
        self.error_count
    }

    /// Successes over all weighted outcomes; 1.0 before any outcome.
    pub fn success_rate(&self) -> f64 {
        success_rate(self.success_count, self.error_count)
    }

    pub fn latencies(&self) -> &LatencyWindow {
        &self.latencies
    }
}

impl Default for NodeHealth {
    fn default() -> Self {
        Self::new()
    }
}

fn success_rate(success_count: u64, error_count: f64) -> f64 {
    let total = success_count as f64 + error_count;
    if total <= 0.0 {
        return 1.0;
    }
    success_count as f64 / total
}

/// Blends success rate and average latency into a 0-100 score.
pub fn compute_score(success_count: u64, error_count: f64, avg_latency_ms: f64) -> u8 {
    let rate = success_rate(success_count, error_count);
    let latency_factor = (1.0 - avg_latency_ms / LATENCY_CEILING_MS).max(0.0);
    let score = (rate * SUCCESS_WEIGHT + latency_factor * LATENCY_WEIGHT).round();
    score.clamp(0.0, 100.0) as u8
}
