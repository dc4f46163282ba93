//! Sample collector
//!
//! Drives the polling loop against one live container: status check, raw
//! snapshot, counter delta, append to history, fixed-interval sleep. The
//! loop runs for a bounded duration or indefinitely until the stop signal
//! fires, and always reports how it ended.

use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::RuntimeError;
use crate::models::SampleHistory;
use crate::observability::SizerMetrics;
use crate::runtime::{ContainerHandle, ContainerRuntime};
use crate::stats::{cpu_percent, memory_mb};

/// Default inter-sample interval. Increasing it changes the statistical
/// weight of transient spikes in the averages downstream.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Collector timing configuration.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Fixed inter-sample interval.
    pub interval: Duration,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SAMPLE_INTERVAL,
        }
    }
}

/// How a collection loop terminated. Only `Interrupted` represents a
/// collection failure; everything else is a normal end condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionEnd {
    /// The requested wall-clock duration elapsed.
    DurationElapsed,
    /// The container left the running state (carries the observed status).
    ContainerExited(String),
    /// The stats source signalled end-of-stream or a malformed payload.
    StreamEnded,
    /// The stop signal fired (manual stop or shutdown).
    Cancelled,
    /// The runtime failed mid-collection; samples gathered so far remain
    /// valid.
    Interrupted(String),
}

/// Run the polling loop until the duration elapses, the container stops,
/// the stats source dries up, or the stop signal fires.
///
/// The first iteration is a warm-up: with no previous snapshot there is
/// no CPU data point, but its memory reading is still recorded.
pub async fn collect(
    runtime: &dyn ContainerRuntime,
    handle: &ContainerHandle,
    config: &SamplerConfig,
    duration: Option<Duration>,
    history: &RwLock<SampleHistory>,
    stop_rx: &mut watch::Receiver<bool>,
    metrics: &SizerMetrics,
) -> CollectionEnd {
    let deadline = duration.map(|d| Instant::now() + d);
    let mut prev = None;

    loop {
        if *stop_rx.borrow() {
            return CollectionEnd::Cancelled;
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return CollectionEnd::DurationElapsed;
            }
        }

        match runtime.status(handle).await {
            Ok(state) if state.is_running() => {}
            Ok(state) => {
                debug!(
                    container_id = %handle.short_id(),
                    status = %state,
                    "Container left running state, ending collection"
                );
                return CollectionEnd::ContainerExited(state.to_string());
            }
            Err(err) => {
                warn!(container_id = %handle.short_id(), error = %err, "Status query failed");
                return CollectionEnd::Interrupted(err.to_string());
            }
        }

        let fetch_start = Instant::now();
        match runtime.stats(handle).await {
            Ok(snapshot) => {
                metrics.observe_stats_latency(fetch_start.elapsed().as_secs_f64());

                let cpu = prev.as_ref().and_then(|p| cpu_percent(p, &snapshot));
                let mem = memory_mb(&snapshot);
                history.write().await.push(cpu, mem);
                metrics.sample_collected();
                prev = Some(snapshot);
            }
            Err(RuntimeError::EndOfStream) => return CollectionEnd::StreamEnded,
            Err(RuntimeError::MalformedStats(msg)) => {
                debug!(container_id = %handle.short_id(), error = %msg, "Malformed stats payload");
                return CollectionEnd::StreamEnded;
            }
            Err(err) => return CollectionEnd::Interrupted(err.to_string()),
        }

        // Sleep one interval, waking early if the stop signal fires so
        // cancellation is observed within at most one interval.
        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    return CollectionEnd::Cancelled;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PortMapping, StatsSnapshot};
    use crate::runtime::{async_trait, ContainerState};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    /// Mock runtime producing a deterministic counter sequence: each
    /// stats call advances container CPU by `cpu_step` and system CPU by
    /// `system_step` nanoseconds.
    struct CountingRuntime {
        cpu_step: u64,
        system_step: u64,
        calls: AtomicU64,
        running_for: u64,
        stats_results: Mutex<Vec<Result<StatsSnapshot, RuntimeError>>>,
        scripted: bool,
    }

    impl CountingRuntime {
        fn new(cpu_step: u64, system_step: u64, running_for: u64) -> Self {
            Self {
                cpu_step,
                system_step,
                calls: AtomicU64::new(0),
                running_for,
                stats_results: Mutex::new(Vec::new()),
                scripted: false,
            }
        }

        fn scripted(results: Vec<Result<StatsSnapshot, RuntimeError>>) -> Self {
            Self {
                cpu_step: 0,
                system_step: 0,
                calls: AtomicU64::new(0),
                running_for: u64::MAX,
                stats_results: Mutex::new(results),
                scripted: true,
            }
        }
    }

    #[async_trait]
    impl ContainerRuntime for CountingRuntime {
        async fn resolve_image(&self, _image: &str) -> Result<(), RuntimeError> {
            Ok(())
        }

        async fn start_container(
            &self,
            _image: &str,
            _command: Option<&[String]>,
            _ports: Option<&[PortMapping]>,
        ) -> Result<ContainerHandle, RuntimeError> {
            Ok(ContainerHandle::new("mock"))
        }

        async fn status(&self, _handle: &ContainerHandle) -> Result<ContainerState, RuntimeError> {
            if self.calls.load(Ordering::SeqCst) >= self.running_for {
                Ok(ContainerState::Exited)
            } else {
                Ok(ContainerState::Running)
            }
        }

        async fn stats(&self, _handle: &ContainerHandle) -> Result<StatsSnapshot, RuntimeError> {
            if self.scripted {
                let mut results = self.stats_results.lock().unwrap();
                if results.is_empty() {
                    return Err(RuntimeError::EndOfStream);
                }
                return results.remove(0);
            }

            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(StatsSnapshot {
                container_cpu_ns: n * self.cpu_step,
                system_cpu_ns: n * self.system_step,
                online_cpus: Some(1),
                percpu_usage: vec![],
                memory_bytes: 100 * 1024 * 1024,
            })
        }

        async fn stop_and_remove(&self, _handle: &ContainerHandle) -> Result<(), RuntimeError> {
            Ok(())
        }

        async fn logs(&self, _handle: &ContainerHandle, _tail: usize) -> Result<String, RuntimeError> {
            Ok(String::new())
        }
    }

    fn fast_config() -> SamplerConfig {
        SamplerConfig {
            interval: Duration::from_millis(5),
        }
    }

    fn snapshot(cpu: u64, system: u64, mem: u64) -> StatsSnapshot {
        StatsSnapshot {
            container_cpu_ns: cpu,
            system_cpu_ns: system,
            online_cpus: Some(1),
            percpu_usage: vec![],
            memory_bytes: mem,
        }
    }

    #[tokio::test]
    async fn test_warm_up_sample_has_memory_but_no_cpu() {
        let runtime = CountingRuntime::new(1_000, 100_000, 1);
        let history = RwLock::new(SampleHistory::new());
        let (_tx, mut rx) = watch::channel(false);

        let end = collect(
            &runtime,
            &ContainerHandle::new("c"),
            &fast_config(),
            Some(Duration::from_secs(10)),
            &history,
            &mut rx,
            &SizerMetrics::new(),
        )
        .await;

        assert_eq!(end, CollectionEnd::ContainerExited("exited".to_string()));
        let history = history.read().await;
        assert_eq!(history.sample_count(), 1);
        assert_eq!(history.cpu().len(), 0);
        assert_eq!(history.mem_mb().len(), 1);
    }

    #[tokio::test]
    async fn test_cpu_points_appear_from_second_sample() {
        let runtime = CountingRuntime::new(1_000, 100_000, 4);
        let history = RwLock::new(SampleHistory::new());
        let (_tx, mut rx) = watch::channel(false);

        let end = collect(
            &runtime,
            &ContainerHandle::new("c"),
            &fast_config(),
            Some(Duration::from_secs(10)),
            &history,
            &mut rx,
            &SizerMetrics::new(),
        )
        .await;

        assert_eq!(end, CollectionEnd::ContainerExited("exited".to_string()));
        let history = history.read().await;
        assert_eq!(history.sample_count(), 4);
        assert_eq!(history.cpu().len(), 3);
        // Constant steps: 1000 / 100000 * 100 = 1% each.
        for pct in history.cpu() {
            assert!((pct - 1.0).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_invalid_delta_skipped_not_zeroed() {
        // Second payload rewinds the system counter; the third is normal.
        let runtime = CountingRuntime::scripted(vec![
            Ok(snapshot(1_000, 100_000, 1024 * 1024)),
            Ok(snapshot(2_000, 100_000, 1024 * 1024)),
            Ok(snapshot(3_000, 300_000, 1024 * 1024)),
            Err(RuntimeError::EndOfStream),
        ]);
        let history = RwLock::new(SampleHistory::new());
        let (_tx, mut rx) = watch::channel(false);

        let end = collect(
            &runtime,
            &ContainerHandle::new("c"),
            &fast_config(),
            None,
            &history,
            &mut rx,
            &SizerMetrics::new(),
        )
        .await;

        assert_eq!(end, CollectionEnd::StreamEnded);
        let history = history.read().await;
        // Three iterations recorded memory; only the third produced a
        // valid CPU delta. No zeros were recorded for the skipped one.
        assert_eq!(history.mem_mb().len(), 3);
        assert_eq!(history.cpu().len(), 1);
        assert!(history.cpu()[0] > 0.0);
    }

    #[tokio::test]
    async fn test_malformed_payload_ends_collection_keeping_samples() {
        let runtime = CountingRuntime::scripted(vec![
            Ok(snapshot(1_000, 100_000, 1024 * 1024)),
            Ok(snapshot(2_000, 200_000, 1024 * 1024)),
            Err(RuntimeError::MalformedStats("truncated".to_string())),
        ]);
        let history = RwLock::new(SampleHistory::new());
        let (_tx, mut rx) = watch::channel(false);

        let end = collect(
            &runtime,
            &ContainerHandle::new("c"),
            &fast_config(),
            None,
            &history,
            &mut rx,
            &SizerMetrics::new(),
        )
        .await;

        assert_eq!(end, CollectionEnd::StreamEnded);
        assert_eq!(history.read().await.sample_count(), 2);
    }

    #[tokio::test]
    async fn test_duration_bound_is_respected() {
        let runtime = CountingRuntime::new(1_000, 100_000, u64::MAX);
        let history = RwLock::new(SampleHistory::new());
        let (_tx, mut rx) = watch::channel(false);

        let end = collect(
            &runtime,
            &ContainerHandle::new("c"),
            &fast_config(),
            Some(Duration::from_millis(30)),
            &history,
            &mut rx,
            &SizerMetrics::new(),
        )
        .await;

        assert_eq!(end, CollectionEnd::DurationElapsed);
        assert!(history.read().await.sample_count() >= 1);
    }

    #[tokio::test]
    async fn test_stop_signal_cancels_unbounded_collection() {
        let runtime = CountingRuntime::new(1_000, 100_000, u64::MAX);
        let history = RwLock::new(SampleHistory::new());
        let (tx, mut rx) = watch::channel(false);

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = tx.send(true);
            tx
        });

        let end = collect(
            &runtime,
            &ContainerHandle::new("c"),
            &fast_config(),
            None,
            &history,
            &mut rx,
            &SizerMetrics::new(),
        )
        .await;

        assert_eq!(end, CollectionEnd::Cancelled);
        let _tx = stopper.await.unwrap();
    }
}
