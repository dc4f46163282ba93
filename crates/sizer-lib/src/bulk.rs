//! Bulk test campaigns
//!
//! Profiles a fixed roster of well-known images sequentially, publishing
//! progress after every run so a poller always sees a coherent picture.
//! Individual failures are recorded and the campaign moves on.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::models::{RunFailure, RunState, SizingRecommendation};
use crate::run::{RunManager, RunSpec};

/// Pause between consecutive runs, letting the runtime settle after the
/// previous container's removal.
const INTER_RUN_PAUSE: Duration = Duration::from_secs(1);

/// One entry of the default campaign roster. `command: None` lets the
/// keep-alive fallback chain pick a startup command.
#[derive(Debug, Clone, Copy)]
pub struct TestImage {
    pub name: &'static str,
    pub command: Option<&'static [&'static str]>,
    pub description: &'static str,
    pub category: &'static str,
}

/// The default campaign roster: common images spanning web servers,
/// databases, language runtimes, and base images. Foreground commands are
/// supplied where the image's default entrypoint would exit immediately.
pub const DEFAULT_TEST_IMAGES: &[TestImage] = &[
    TestImage { name: "nginx:latest", command: Some(&["nginx", "-g", "daemon off;"]), description: "Nginx Web Server", category: "Web Servers" },
    TestImage { name: "httpd:latest", command: Some(&["httpd-foreground"]), description: "Apache HTTP Server", category: "Web Servers" },
    TestImage { name: "redis:latest", command: Some(&["redis-server"]), description: "Redis Cache", category: "Databases" },
    TestImage { name: "postgres:latest", command: None, description: "PostgreSQL Database", category: "Databases" },
    TestImage { name: "mysql:latest", command: None, description: "MySQL Database", category: "Databases" },
    TestImage { name: "python:3.11", command: Some(&["sleep", "3600"]), description: "Python 3.11", category: "Languages" },
    TestImage { name: "node:18", command: Some(&["sleep", "3600"]), description: "Node.js 18", category: "Languages" },
    TestImage { name: "openjdk:17", command: Some(&["jshell"]), description: "OpenJDK 17", category: "Languages" },
    TestImage { name: "alpine:latest", command: None, description: "Alpine Linux", category: "Base Images" },
    TestImage { name: "ubuntu:latest", command: None, description: "Ubuntu Linux", category: "Base Images" },
];

/// One campaign target, either from the default roster or a custom list.
#[derive(Debug, Clone)]
struct BulkTarget {
    image: String,
    command: Option<Vec<String>>,
    description: Option<String>,
    category: Option<String>,
}

impl From<&TestImage> for BulkTarget {
    fn from(entry: &TestImage) -> Self {
        Self {
            image: entry.name.to_string(),
            command: entry
                .command
                .map(|c| c.iter().map(|s| s.to_string()).collect()),
            description: Some(entry.description.to_string()),
            category: Some(entry.category.to_string()),
        }
    }
}

/// Campaign lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkStatus {
    Idle,
    Running,
    Completed,
}

/// Outcome of one image within a campaign.
#[derive(Debug, Clone, Serialize)]
pub struct BulkOutcome {
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<SizingRecommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_peak: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem_peak_mb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
}

/// Published progress of the current (or last) campaign.
///
/// All fields are updated together under one lock, so readers never see a
/// completed count that disagrees with the outcome list.
#[derive(Debug, Clone, Serialize)]
pub struct BulkProgress {
    pub status: BulkStatus,
    pub total: usize,
    pub completed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_image: Option<String>,
    pub outcomes: Vec<BulkOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl BulkProgress {
    fn idle() -> Self {
        Self {
            status: BulkStatus::Idle,
            total: 0,
            completed: 0,
            current_image: None,
            outcomes: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }
}

/// Sequential campaign driver over a [`RunManager`].
pub struct BulkRunner {
    manager: Arc<RunManager>,
    progress: RwLock<BulkProgress>,
}

impl BulkRunner {
    pub fn new(manager: Arc<RunManager>) -> Self {
        Self {
            manager,
            progress: RwLock::new(BulkProgress::idle()),
        }
    }

    /// Current progress snapshot.
    pub async fn progress(&self) -> BulkProgress {
        self.progress.read().await.clone()
    }

    /// Start a campaign over `images` (or the default roster), profiling
    /// each for `duration`. Returns `false` when a campaign is already in
    /// flight.
    pub async fn start(
        self: &Arc<Self>,
        images: Option<Vec<String>>,
        duration: Duration,
    ) -> bool {
        let targets: Vec<BulkTarget> = match images {
            Some(images) => images
                .into_iter()
                .map(|image| BulkTarget {
                    image,
                    command: None,
                    description: None,
                    category: None,
                })
                .collect(),
            None => DEFAULT_TEST_IMAGES.iter().map(BulkTarget::from).collect(),
        };

        {
            let mut progress = self.progress.write().await;
            if progress.status == BulkStatus::Running {
                return false;
            }
            *progress = BulkProgress {
                status: BulkStatus::Running,
                total: targets.len(),
                completed: 0,
                current_image: None,
                outcomes: Vec::new(),
                started_at: Some(Utc::now()),
                finished_at: None,
            };
        }

        info!(total = targets.len(), duration_secs = duration.as_secs(), "Starting bulk campaign");

        let runner = self.clone();
        tokio::spawn(async move {
            runner.execute(targets, duration).await;
        });
        true
    }

    async fn execute(&self, targets: Vec<BulkTarget>, duration: Duration) {
        let total = targets.len();
        for (index, target) in targets.into_iter().enumerate() {
            self.progress.write().await.current_image = Some(target.image.clone());

            let outcome = self.profile_one(&target, duration).await;
            if outcome.state == RunState::Failed {
                warn!(image = %target.image, "Bulk campaign run failed, continuing");
            }

            {
                let mut progress = self.progress.write().await;
                progress.outcomes.push(outcome);
                progress.completed = index + 1;
            }

            if index + 1 < total {
                tokio::time::sleep(INTER_RUN_PAUSE).await;
            }
        }

        let mut progress = self.progress.write().await;
        progress.status = BulkStatus::Completed;
        progress.current_image = None;
        progress.finished_at = Some(Utc::now());
        info!(
            total = progress.total,
            failed = progress
                .outcomes
                .iter()
                .filter(|o| o.state == RunState::Failed)
                .count(),
            "Bulk campaign finished"
        );
    }

    async fn profile_one(&self, target: &BulkTarget, duration: Duration) -> BulkOutcome {
        let spec = RunSpec::new(target.image.clone(), Some(duration))
            .with_command(target.command.clone());
        let id = self.manager.start_run(spec);

        match self.manager.wait(&id).await {
            Some(record) => BulkOutcome {
                image: target.image.clone(),
                description: target.description.clone(),
                category: target.category.clone(),
                state: record.state,
                recommendation: record.recommendation,
                cpu_peak: record.stats.as_ref().map(|s| s.cpu_peak),
                mem_peak_mb: record.stats.as_ref().map(|s| s.mem_peak_mb),
                failure: record.failure,
            },
            None => BulkOutcome {
                image: target.image.clone(),
                description: target.description.clone(),
                category: target.category.clone(),
                state: RunState::Failed,
                recommendation: None,
                cpu_peak: None,
                mem_peak_mb: None,
                failure: None,
            },
        }
    }
}
