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

use std::collections::VecDeque;
use std::time::Duration;

/// Number of latency samples retained per node.
pub const LATENCY_WINDOW_SIZE: usize = 100;

/// Bounded ring buffer of the most recent latency samples.
///
/// Once `capacity` samples are held, each new sample evicts the oldest one.
/// Averages and percentiles are computed over whatever the window currently
/// holds, so they describe recent behaviour rather than lifetime behaviour.
///
/// # Example
///
/// ```rust
/// use genmux_metrics::LatencyWindow;
/// use std::time::Duration;
///
/// let mut window = LatencyWindow::with_capacity(2);
/// window.push(Duration::from_millis(100));
/// window.push(Duration::from_millis(200));
/// window.push(Duration::from_millis(300));
///
/// assert_eq!(window.len(), 2);
/// assert_eq!(window.avg_ms(), 250.0);
/// ```
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl LatencyWindow {
    pub fn new() -> Self {
        Self::with_capacity(LATENCY_WINDOW_SIZE)
    }

    /// Creates a window holding at most `capacity` samples (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a sample, evicting the oldest one if the window is full.
    pub fn push(&mut self, latency: Duration) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(latency);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest-first iterator over the retained samples.
    pub fn iter(&self) -> impl Iterator<Item = &Duration> {
        self.samples.iter()
    }

    /// Mean latency in milliseconds, or 0 when empty.
    pub fn avg_ms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let total: f64 = self
            .samples
            .iter()
            .map(|d| d.as_secs_f64() * 1000.0)
            .sum();
        total / self.samples.len() as f64
    }

    /// Nearest-rank percentile (0-100) over the retained samples.
    ///
    /// Returns `Duration::ZERO` when the window is empty.
    pub fn percentile(&self, percentile: u8) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }

        let mut sorted: Vec<Duration> = self.samples.iter().copied().collect();
        sorted.sort_unstable();

        let percentile = percentile.min(100) as usize;
        let rank = (percentile * sorted.len()).div_ceil(100).max(1);
        sorted[rank - 1]
    }
}

impl Default for LatencyWindow {
    fn default() -> Self {
        Self::new()
    }
}
