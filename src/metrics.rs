//! In‑process request outcome aggregation.
//!
//! [`GatewayMetrics`] keeps running totals plus a fixed‑capacity FIFO of the
//! most recent latency samples. Snapshots sort a copy of the ring, so
//! percentiles describe recent traffic only. Snapshotting is meant for
//! status endpoints and periodic logging, not for every request.
use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use serde::Serialize;

/// Number of latency samples retained for percentile computation.
pub const LATENCY_WINDOW: usize = 10_000;

#[derive(Debug, Default)]
struct MetricsState {
    requests_total: u64,
    requests_success: u64,
    requests_failed: u64,
    bytes_in: u64,
    bytes_out: u64,
    latencies_ms: VecDeque<f64>,
}

/// Aggregated view returned by [`GatewayMetrics::get_stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub requests_success: u64,
    pub requests_failed: u64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

#[derive(Debug)]
pub struct GatewayMetrics {
    capacity: usize,
    state: Mutex<MetricsState>,
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn percentile(sorted: &[f64], quantile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = ((sorted.len() as f64 * quantile).floor() as usize).min(sorted.len() - 1);
    sorted[index]
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::with_capacity(LATENCY_WINDOW)
    }

    /// Aggregator retaining at most `capacity` latency samples (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(MetricsState {
                latencies_ms: VecDeque::with_capacity(capacity.min(LATENCY_WINDOW)),
                ..MetricsState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MetricsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one completed call.
    pub fn record_request(&self, success: bool, latency_ms: f64, bytes_in: u64, bytes_out: u64) {
        let mut state = self.lock();
        state.requests_total += 1;
        if success {
            state.requests_success += 1;
        } else {
            state.requests_failed += 1;
        }
        state.bytes_in += bytes_in;
        state.bytes_out += bytes_out;
        if state.latencies_ms.len() == self.capacity {
            state.latencies_ms.pop_front();
        }
        state.latencies_ms.push_back(latency_ms);
    }

    pub fn latency_samples(&self) -> usize {
        self.lock().latencies_ms.len()
    }

    pub fn get_stats(&self) -> MetricsSnapshot {
        let state = self.lock();
        let mut sorted: Vec<f64> = state.latencies_ms.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let avg_latency_ms = if sorted.is_empty() {
            0.0
        } else {
            sorted.iter().sum::<f64>() / sorted.len() as f64
        };

        MetricsSnapshot {
            requests_total: state.requests_total,
            requests_success: state.requests_success,
            requests_failed: state.requests_failed,
            success_rate: state.requests_success as f64 / state.requests_total.max(1) as f64,
            avg_latency_ms,
            p95_latency_ms: percentile(&sorted, 0.95),
            p99_latency_ms: percentile(&sorted, 0.99),
            bytes_in: state.bytes_in,
            bytes_out: state.bytes_out,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn test_empty_stats() {
        let metrics = GatewayMetrics::new();
        let stats = metrics.get_stats();
        assert_eq!(stats.requests_total, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.avg_latency_ms, 0.0);
        assert_eq!(stats.p95_latency_ms, 0.0);
        assert_eq!(stats.p99_latency_ms, 0.0);
    }

    #[test]
    fn test_percentiles_over_one_to_hundred() {
        let metrics = GatewayMetrics::new();
        // Insert in reverse to make sure the snapshot sorts
        for latency in (1..=100).rev() {
            metrics.record_request(true, latency as f64, 0, 0);
        }
        let stats = metrics.get_stats();
        assert_eq!(stats.avg_latency_ms, 50.5);
        assert_eq!(stats.p95_latency_ms, 96.0);
        assert_eq!(stats.p99_latency_ms, 100.0);
    }

    #[test]
    fn test_totals_and_success_rate() {
        let metrics = GatewayMetrics::new();
        metrics.record_request(true, 10.0, 100, 1000);
        metrics.record_request(true, 20.0, 50, 500);
        metrics.record_request(true, 30.0, 0, 0);
        metrics.record_request(false, 40.0, 10, 0);

        let stats = metrics.get_stats();
        assert_eq!(stats.requests_total, 4);
        assert_eq!(stats.requests_success, 3);
        assert_eq!(stats.requests_failed, 1);
        assert_eq!(stats.success_rate, 0.75);
        assert_eq!(stats.bytes_in, 160);
        assert_eq!(stats.bytes_out, 1500);
        assert_eq!(stats.avg_latency_ms, 25.0);
    }

    #[test]
    fn test_ring_evicts_oldest_samples() {
        let metrics = GatewayMetrics::with_capacity(3);
        for latency in [1000.0, 1.0, 2.0, 3.0] {
            metrics.record_request(true, latency, 0, 0);
        }
        let stats = metrics.get_stats();
        assert_eq!(metrics.latency_samples(), 3);
        assert_eq!(stats.requests_total, 4);
        assert_eq!(stats.avg_latency_ms, 2.0);
        assert_eq!(stats.p99_latency_ms, 3.0);
    }

    #[test]
    fn test_default_capacity_is_bounded() {
        let metrics = GatewayMetrics::new();
        for _ in 0..(LATENCY_WINDOW + 500) {
            metrics.record_request(true, 1.0, 0, 0);
        }
        assert_eq!(metrics.latency_samples(), LATENCY_WINDOW);
    }

    #[test]
    fn test_concurrent_recording() {
        let metrics = Arc::new(GatewayMetrics::new());
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let metrics = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..250 {
                        metrics.record_request(worker % 2 == 0, 5.0, 1, 2);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let stats = metrics.get_stats();
        assert_eq!(stats.requests_total, 1000);
        assert_eq!(stats.requests_success, 500);
        assert_eq!(stats.bytes_in, 1000);
        assert_eq!(stats.bytes_out, 2000);
    }
}
