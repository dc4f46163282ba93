//! Core data models for the container sizer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RunError;

/// One point-in-time reading of the container's cumulative CPU counters
/// and memory gauge, as reported by the container runtime.
///
/// Two consecutive snapshots are required to derive a CPU rate; memory is
/// an absolute gauge and needs no delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Cumulative CPU time consumed by the container, in nanoseconds.
    pub container_cpu_ns: u64,
    /// Cumulative CPU time consumed system-wide, in nanoseconds.
    pub system_cpu_ns: u64,
    /// Online CPU count as reported by the runtime, when present.
    pub online_cpus: Option<u32>,
    /// Per-CPU usage array; its length is the fallback CPU count.
    pub percpu_usage: Vec<u64>,
    /// Current resident memory usage in bytes.
    pub memory_bytes: u64,
}

/// A single collected sample, as exposed to live-view readers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    /// CPU utilization percent; `None` for warm-up or skipped samples.
    pub cpu_percent: Option<f64>,
    pub memory_mb: f64,
    pub at: DateTime<Utc>,
}

/// Ordered, append-only history of samples for one profiling run.
///
/// CPU and memory are kept as independent series: the warm-up iteration
/// (and any iteration with an invalid counter delta) contributes a memory
/// point but no CPU point.
#[derive(Debug, Clone, Serialize)]
pub struct SampleHistory {
    cpu: Vec<f64>,
    mem_mb: Vec<f64>,
    sample_count: u64,
    started_at: DateTime<Utc>,
    last: Option<Sample>,
}

impl SampleHistory {
    pub fn new() -> Self {
        Self {
            cpu: Vec::new(),
            mem_mb: Vec::new(),
            sample_count: 0,
            started_at: Utc::now(),
            last: None,
        }
    }

    /// Append one iteration's worth of data. A `None` CPU value means the
    /// sample was skipped (warm-up or invalid delta), not that it was zero.
    pub fn push(&mut self, cpu_percent: Option<f64>, memory_mb: f64) {
        if let Some(cpu) = cpu_percent {
            self.cpu.push(cpu);
        }
        self.mem_mb.push(memory_mb);
        self.sample_count += 1;
        self.last = Some(Sample {
            cpu_percent,
            memory_mb,
            at: Utc::now(),
        });
    }

    pub fn cpu(&self) -> &[f64] {
        &self.cpu
    }

    pub fn mem_mb(&self) -> &[f64] {
        &self.mem_mb
    }

    /// Number of collection iterations, including CPU-less warm-up samples.
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn last_sample(&self) -> Option<Sample> {
        self.last.clone()
    }

    /// Wall-clock seconds since collection started.
    pub fn duration_secs(&self) -> f64 {
        let elapsed = Utc::now().signed_duration_since(self.started_at);
        (elapsed.num_milliseconds().max(0) as f64) / 1000.0
    }

    /// True when either series is empty and no aggregate can be produced.
    pub fn is_incomplete(&self) -> bool {
        self.cpu.is_empty() || self.mem_mb.is_empty()
    }
}

impl Default for SampleHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary statistics reduced from a [`SampleHistory`].
///
/// Invariant: peak >= avg >= 0 for each series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateStats {
    pub cpu_avg: f64,
    pub cpu_peak: f64,
    pub mem_avg_mb: f64,
    pub mem_peak_mb: f64,
    pub sample_count: u64,
    pub duration_secs: f64,
}

/// Vendor instance names for one sizing tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceSet {
    pub aws: String,
    pub gcp: String,
    pub azure: String,
}

/// Discrete sizing recommendation derived from peak usage.
///
/// Recomputed fresh from aggregate peaks on every request; it has no
/// lifecycle of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingRecommendation {
    pub vcpu: u32,
    pub ram_gb: f64,
    pub instances: InstanceSet,
}

/// Lifecycle state of a profiling run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Resolving,
    Starting,
    Collecting,
    Stopping,
    Finalizing,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Resolving => "resolving",
            RunState::Starting => "starting",
            RunState::Collecting => "collecting",
            RunState::Stopping => "stopping",
            RunState::Finalizing => "finalizing",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Classification of a run failure, stable across the API and batch
/// summaries so failures can be grouped by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ImagePull,
    ContainerStart,
    EmptyHistory,
    Collection,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ImagePull => "image_pull",
            FailureKind::ContainerStart => "container_start",
            FailureKind::EmptyHistory => "empty_history",
            FailureKind::Collection => "collection",
        }
    }
}

/// Structured cause attached to a run in the `Failed` state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&RunError> for RunFailure {
    fn from(err: &RunError) -> Self {
        let kind = match err {
            RunError::ImagePull { .. } => FailureKind::ImagePull,
            RunError::ContainerStart { .. } => FailureKind::ContainerStart,
            RunError::EmptyHistory => FailureKind::EmptyHistory,
            RunError::Collection(_) => FailureKind::Collection,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

/// A host-to-container port binding requested at launch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_warm_up_records_memory_only() {
        let mut history = SampleHistory::new();
        history.push(None, 42.0);

        assert_eq!(history.cpu().len(), 0);
        assert_eq!(history.mem_mb(), &[42.0]);
        assert_eq!(history.sample_count(), 1);
        assert!(history.is_incomplete());
    }

    #[test]
    fn test_history_complete_after_valid_cpu_sample() {
        let mut history = SampleHistory::new();
        history.push(None, 42.0);
        history.push(Some(12.5), 43.0);

        assert_eq!(history.cpu(), &[12.5]);
        assert_eq!(history.mem_mb(), &[42.0, 43.0]);
        assert_eq!(history.sample_count(), 2);
        assert!(!history.is_incomplete());
    }

    #[test]
    fn test_last_sample_reflects_latest_push() {
        let mut history = SampleHistory::new();
        history.push(Some(10.0), 100.0);
        history.push(None, 101.0);

        let last = history.last_sample().unwrap();
        assert_eq!(last.cpu_percent, None);
        assert_eq!(last.memory_mb, 101.0);
    }

    #[test]
    fn test_run_state_terminality() {
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::Collecting.is_terminal());
        assert!(!RunState::Finalizing.is_terminal());
    }

    #[test]
    fn test_failure_kind_from_error() {
        let failure = RunFailure::from(&RunError::EmptyHistory);
        assert_eq!(failure.kind, FailureKind::EmptyHistory);
        assert!(!failure.message.is_empty());
    }
}
