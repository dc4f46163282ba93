//! Prometheus metrics for the sizer
//!
//! A lightweight handle over globally registered metrics; clones share
//! the same underlying collectors.

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;

/// Histogram buckets for per-sample stats latency (seconds).
const STATS_LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5];

static GLOBAL_METRICS: OnceLock<SizerMetricsInner> = OnceLock::new();

struct SizerMetricsInner {
    runs_started: IntCounter,
    runs_completed: IntCounter,
    runs_failed: IntCounterVec,
    samples_collected: IntCounter,
    active_runs: IntGauge,
    stats_latency_seconds: Histogram,
}

impl SizerMetricsInner {
    fn new() -> Self {
        Self {
            runs_started: register_int_counter!(
                "sizer_runs_started_total",
                "Total number of profiling runs started"
            )
            .expect("Failed to register runs_started_total"),

            runs_completed: register_int_counter!(
                "sizer_runs_completed_total",
                "Total number of profiling runs that completed with a recommendation"
            )
            .expect("Failed to register runs_completed_total"),

            runs_failed: register_int_counter_vec!(
                "sizer_runs_failed_total",
                "Total number of failed profiling runs by failure kind",
                &["kind"]
            )
            .expect("Failed to register runs_failed_total"),

            samples_collected: register_int_counter!(
                "sizer_samples_collected_total",
                "Total number of resource samples collected across all runs"
            )
            .expect("Failed to register samples_collected_total"),

            active_runs: register_int_gauge!(
                "sizer_active_runs",
                "Number of profiling runs currently in a non-terminal state"
            )
            .expect("Failed to register active_runs"),

            stats_latency_seconds: register_histogram!(
                "sizer_stats_latency_seconds",
                "Time spent fetching one stats snapshot from the container runtime",
                STATS_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register stats_latency_seconds"),
        }
    }
}

/// Handle to the sizer's Prometheus metrics.
#[derive(Clone)]
pub struct SizerMetrics {
    _private: (),
}

impl Default for SizerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SizerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SizerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SizerMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn run_started(&self) {
        self.inner().runs_started.inc();
        self.inner().active_runs.inc();
    }

    pub fn run_completed(&self) {
        self.inner().runs_completed.inc();
        self.inner().active_runs.dec();
    }

    pub fn run_failed(&self, kind: &str) {
        self.inner().runs_failed.with_label_values(&[kind]).inc();
        self.inner().active_runs.dec();
    }

    pub fn sample_collected(&self) {
        self.inner().samples_collected.inc();
    }

    pub fn observe_stats_latency(&self, duration_secs: f64) {
        self.inner().stats_latency_seconds.observe(duration_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handle_is_shared() {
        let a = SizerMetrics::new();
        let b = SizerMetrics::new();

        a.sample_collected();
        b.sample_collected();

        let families = prometheus::gather();
        let samples = families
            .iter()
            .find(|f| f.get_name() == "sizer_samples_collected_total")
            .expect("metric registered");
        assert!(samples.get_metric()[0].get_counter().get_value() >= 2.0);
    }
}
