//! Run controller
//!
//! Orchestrates one profiling run end-to-end: resolve the image, start a
//! container, collect samples, aggregate, recommend, and always clean the
//! container up. Each run owns a spawned task whose handle the manager
//! keeps, so cancellation and completion are awaitable rather than
//! fire-and-forget, and Finalizing is guaranteed to execute.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::aggregate::aggregate;
use crate::collector::{collect, CollectionEnd, SamplerConfig};
use crate::error::{RunError, RuntimeError};
use crate::launch::LaunchPlan;
use crate::models::{
    AggregateStats, PortMapping, RunFailure, RunState, Sample, SampleHistory,
    SizingRecommendation,
};
use crate::observability::SizerMetrics;
use crate::recommend::recommend;
use crate::runtime::{ContainerHandle, ContainerRuntime};

/// Identifier for one profiling run.
pub type RunId = String;

/// Request to profile one target image.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub image: String,
    /// `None` means live-monitoring: collect until manually stopped.
    pub duration: Option<Duration>,
    /// Explicit startup command; `None` engages the keep-alive chain.
    pub command: Option<Vec<String>>,
    pub ports: Option<Vec<PortMapping>>,
}

impl RunSpec {
    pub fn new(image: impl Into<String>, duration: Option<Duration>) -> Self {
        Self {
            image: image.into(),
            duration,
            command: None,
            ports: None,
        }
    }

    pub fn with_command(mut self, command: Option<Vec<String>>) -> Self {
        self.command = command;
        self
    }

    pub fn with_ports(mut self, ports: Option<Vec<PortMapping>>) -> Self {
        self.ports = ports;
        self
    }
}

/// The top-level record for one profiling run.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: RunId,
    pub image: String,
    pub state: RunState,
    /// Label of the launch command that actually started the container.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_command: Option<String>,
    pub requested_duration_secs: Option<u64>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub sample_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<AggregateStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<SizingRecommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
}

/// Point-in-time view of a run for pollers.
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub id: RunId,
    pub image: String,
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sample: Option<Sample>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate_so_far: Option<AggregateStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
}

/// Per-run shared state. The record is authoritative; the history is
/// single-writer (the run task) with readers taking snapshot copies.
struct RunShared {
    record: RwLock<RunRecord>,
    history: RwLock<SampleHistory>,
    container: RwLock<Option<ContainerHandle>>,
    stop_tx: watch::Sender<bool>,
    /// Held so a stop requested before the run task is first polled is
    /// never lost: with a live receiver the send always lands.
    stop_rx: watch::Receiver<bool>,
    /// Flipped to true by the run task after the terminal record is
    /// written; any number of waiters can subscribe.
    done_tx: watch::Sender<bool>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl RunShared {
    fn new(id: RunId, spec: &RunSpec) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (done_tx, _) = watch::channel(false);
        Self {
            record: RwLock::new(RunRecord {
                id,
                image: spec.image.clone(),
                state: RunState::Idle,
                launch_command: None,
                requested_duration_secs: spec.duration.map(|d| d.as_secs()),
                started_at: Utc::now(),
                finished_at: None,
                sample_count: 0,
                stats: None,
                recommendation: None,
                failure: None,
            }),
            history: RwLock::new(SampleHistory::new()),
            container: RwLock::new(None),
            stop_tx,
            stop_rx,
            done_tx,
            task: std::sync::Mutex::new(None),
        }
    }

    async fn set_state(&self, state: RunState) {
        let mut record = self.record.write().await;
        debug!(run_id = %record.id, from = %record.state, to = %state, "Run state transition");
        record.state = state;
    }

    fn take_task(&self) -> Option<JoinHandle<()>> {
        self.task.lock().expect("task lock poisoned").take()
    }
}

/// Registry and controller for profiling runs.
///
/// The registry is the only mutable state shared across runs; each run's
/// polling loop executes on its own tokio task.
pub struct RunManager {
    runtime: Arc<dyn ContainerRuntime>,
    sampler: SamplerConfig,
    runs: DashMap<RunId, Arc<RunShared>>,
    next_id: AtomicU64,
    metrics: SizerMetrics,
}

impl RunManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, sampler: SamplerConfig) -> Self {
        Self {
            runtime,
            sampler,
            runs: DashMap::new(),
            next_id: AtomicU64::new(1),
            metrics: SizerMetrics::new(),
        }
    }

    /// Start a profiling run and return its identifier. The run proceeds
    /// on its own task; use [`poll_run`](Self::poll_run),
    /// [`wait`](Self::wait) or [`stop_run`](Self::stop_run) to follow it.
    pub fn start_run(self: &Arc<Self>, spec: RunSpec) -> RunId {
        let id = format!("run-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let shared = Arc::new(RunShared::new(id.clone(), &spec));
        self.runs.insert(id.clone(), shared.clone());

        info!(run_id = %id, image = %spec.image, duration_secs = ?spec.duration.map(|d| d.as_secs()), "Starting profiling run");
        self.metrics.run_started();

        let manager = self.clone();
        let task_shared = shared.clone();
        let task = tokio::spawn(async move {
            execute_run(manager, task_shared, spec).await;
        });
        *shared.task.lock().expect("task lock poisoned") = Some(task);

        id
    }

    /// Current state plus the latest sample and a live aggregate, when
    /// one can be computed.
    pub async fn poll_run(&self, id: &str) -> Option<RunSnapshot> {
        let shared = self.runs.get(id)?.clone();
        let record = shared.record.read().await.clone();
        let history = shared.history.read().await.clone();

        Some(RunSnapshot {
            id: record.id,
            image: record.image,
            state: record.state,
            last_sample: history.last_sample(),
            aggregate_so_far: aggregate(&history).ok(),
            failure: record.failure,
        })
    }

    /// Request a manual stop and wait for the run to finalize.
    ///
    /// Idempotent: a run that is already terminal returns its stored
    /// record without re-running cleanup or mutating the result.
    pub async fn stop_run(&self, id: &str) -> Option<RunRecord> {
        let shared = self.runs.get(id)?.clone();

        // Terminal check and the Stopping transition share one write
        // lock, so a finished run can never flip back to Stopping.
        {
            let mut record = shared.record.write().await;
            if record.state.is_terminal() {
                let record = record.clone();
                return Some(record);
            }
            debug!(run_id = %record.id, from = %record.state, "Manual stop requested");
            record.state = RunState::Stopping;
        }

        let _ = shared.stop_tx.send(true);
        wait_terminal(&shared).await;

        let record = shared.record.read().await.clone();
        Some(record)
    }

    /// Wait for a run to reach a terminal state and return its record.
    pub async fn wait(&self, id: &str) -> Option<RunRecord> {
        let shared = self.runs.get(id)?.clone();
        wait_terminal(&shared).await;
        let record = shared.record.read().await.clone();
        Some(record)
    }

    /// Final record of a terminal run; `None` while still in flight.
    pub async fn get_result(&self, id: &str) -> Option<RunRecord> {
        let shared = self.runs.get(id)?.clone();
        let record = shared.record.read().await;
        if record.state.is_terminal() {
            Some(record.clone())
        } else {
            None
        }
    }

    /// Tail of the profiled container's logs, for live viewers.
    pub async fn logs(&self, id: &str, tail: usize) -> Result<String> {
        let shared = self
            .runs
            .get(id)
            .map(|r| r.clone())
            .with_context(|| format!("unknown run: {id}"))?;
        let container = shared
            .container
            .read()
            .await
            .clone()
            .context("container not started yet")?;
        Ok(self.runtime.logs(&container, tail).await?)
    }

    /// Identifiers of all known runs.
    pub fn list_runs(&self) -> Vec<RunId> {
        self.runs.iter().map(|r| r.key().clone()).collect()
    }

    /// Evict terminal runs from the registry and return how many were
    /// dropped. Without pruning the registry grows for the life of the
    /// process; long-running agents should call this periodically or
    /// after results have been retrieved. In-flight runs are untouched.
    pub async fn prune_terminal(&self) -> usize {
        let ids = self.list_runs();
        let mut evicted = 0;
        for id in ids {
            let Some(shared) = self.runs.get(&id).map(|r| r.clone()) else {
                continue;
            };
            if shared.record.read().await.state.is_terminal() {
                self.runs.remove(&id);
                evicted += 1;
            }
        }
        if evicted > 0 {
            info!(evicted, "Pruned terminal runs");
        }
        evicted
    }

    fn runtime(&self) -> &dyn ContainerRuntime {
        self.runtime.as_ref()
    }
}

/// Block until the run task has published its terminal record. Any
/// number of callers may wait concurrently; whoever arrives first also
/// joins the finished task so its handle is not left dangling.
async fn wait_terminal(shared: &Arc<RunShared>) {
    let mut done_rx = shared.done_tx.subscribe();
    // Returns immediately when the run already finished.
    let _ = done_rx.wait_for(|done| *done).await;
    if let Some(task) = shared.take_task() {
        let _ = task.await;
    }
}

/// The run task body: drive the state machine, then finalize.
async fn execute_run(manager: Arc<RunManager>, shared: Arc<RunShared>, spec: RunSpec) {
    let mut stop_rx = shared.stop_rx.clone();
    let outcome = drive(&manager, &shared, &spec, &mut stop_rx).await;

    // Finalizing: unconditional, best-effort cleanup. Failures are logged
    // and never overwrite the run's primary outcome.
    shared.set_state(RunState::Finalizing).await;
    let container = shared.container.read().await.clone();
    if let Some(handle) = container {
        if let Err(err) = manager.runtime().stop_and_remove(&handle).await {
            warn!(
                container_id = %handle.short_id(),
                error = %err,
                "Container cleanup failed"
            );
        }
    }

    let history = shared.history.read().await.clone();
    let mut record = shared.record.write().await;
    record.finished_at = Some(Utc::now());
    record.sample_count = history.sample_count();

    let result = outcome.and_then(|end| classify_collection_end(end, &history));
    match result {
        Ok(()) => match aggregate(&history) {
            Ok(stats) => {
                let recommendation = recommend(stats.cpu_peak, stats.mem_peak_mb);
                info!(
                    run_id = %record.id,
                    samples = stats.sample_count,
                    cpu_peak = stats.cpu_peak,
                    mem_peak_mb = stats.mem_peak_mb,
                    vcpu = recommendation.vcpu,
                    ram_gb = recommendation.ram_gb,
                    "Run completed"
                );
                record.stats = Some(stats);
                record.recommendation = Some(recommendation);
                record.state = RunState::Completed;
                manager.metrics.run_completed();
            }
            Err(err) => {
                let failure = RunFailure::from(&err);
                warn!(run_id = %record.id, kind = failure.kind.as_str(), "Run failed");
                manager.metrics.run_failed(failure.kind.as_str());
                record.failure = Some(failure);
                record.state = RunState::Failed;
            }
        },
        Err(err) => {
            let failure = RunFailure::from(&err);
            warn!(run_id = %record.id, kind = failure.kind.as_str(), error = %err, "Run failed");
            manager.metrics.run_failed(failure.kind.as_str());
            record.failure = Some(failure);
            record.state = RunState::Failed;
        }
    }
    drop(record);

    // send_replace updates the value even with no subscribers, so a
    // waiter arriving later still observes completion.
    shared.done_tx.send_replace(true);
}

/// Resolve, start, and collect. Returns the collection end condition, or
/// the error that prevented collection from starting.
async fn drive(
    manager: &RunManager,
    shared: &RunShared,
    spec: &RunSpec,
    stop_rx: &mut watch::Receiver<bool>,
) -> Result<CollectionEnd, RunError> {
    shared.set_state(RunState::Resolving).await;
    manager
        .runtime()
        .resolve_image(&spec.image)
        .await
        .map_err(|err| map_resolve_error(&spec.image, err))?;

    shared.set_state(RunState::Starting).await;
    let plan = LaunchPlan::for_command(spec.command.clone());
    let (handle, label) = plan
        .launch(manager.runtime(), &spec.image, spec.ports.as_deref())
        .await?;
    *shared.container.write().await = Some(handle.clone());
    shared.record.write().await.launch_command = Some(label);

    shared.set_state(RunState::Collecting).await;
    let end = collect(
        manager.runtime(),
        &handle,
        &manager.sampler,
        spec.duration,
        &shared.history,
        stop_rx,
        &manager.metrics,
    )
    .await;

    Ok(end)
}

/// An interruption with no samples is a collection failure; with samples
/// it is downgraded to early termination and the data is kept.
fn classify_collection_end(
    end: CollectionEnd,
    history: &SampleHistory,
) -> Result<(), RunError> {
    match end {
        CollectionEnd::Interrupted(msg) if history.sample_count() == 0 => {
            Err(RunError::Collection(msg))
        }
        _ => Ok(()),
    }
}

fn map_resolve_error(image: &str, err: RuntimeError) -> RunError {
    RunError::ImagePull {
        image: image.to_string(),
        reason: err.to_string(),
    }
}
