//! Report artifacts
//!
//! Serializes a completed run into the stable JSON shape consumed by
//! external tooling. Numeric fields are rounded to two decimals at the
//! boundary; in-memory values stay full precision.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{InstanceSet, RunState};
use crate::recommend::round2;
use crate::run::RunRecord;

/// Recommendation block of the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRecommendation {
    pub vcpu: u32,
    pub ram_gb: f64,
    pub instances: InstanceSet,
}

/// The persisted result for one profiled image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceReport {
    pub image: String,
    pub duration_sec: f64,
    pub cpu_avg: f64,
    pub cpu_peak: f64,
    pub mem_avg_mb: f64,
    pub mem_peak_mb: f64,
    pub samples: u64,
    pub recommendation: ReportRecommendation,
}

impl ResourceReport {
    /// Build a report from a completed run. Fails for runs in any other
    /// state, or for completed runs missing their aggregate (which would
    /// indicate a controller bug).
    pub fn from_record(record: &RunRecord) -> Result<Self> {
        if record.state != RunState::Completed {
            bail!("run {} is not completed (state: {})", record.id, record.state);
        }
        let stats = record
            .stats
            .as_ref()
            .with_context(|| format!("run {} has no aggregate stats", record.id))?;
        let recommendation = record
            .recommendation
            .as_ref()
            .with_context(|| format!("run {} has no recommendation", record.id))?;

        Ok(Self {
            image: record.image.clone(),
            duration_sec: round2(stats.duration_secs),
            cpu_avg: round2(stats.cpu_avg),
            cpu_peak: round2(stats.cpu_peak),
            mem_avg_mb: round2(stats.mem_avg_mb),
            mem_peak_mb: round2(stats.mem_peak_mb),
            samples: stats.sample_count,
            recommendation: ReportRecommendation {
                vcpu: recommendation.vcpu,
                ram_gb: recommendation.ram_gb,
                instances: recommendation.instances.clone(),
            },
        })
    }

    /// Write the report as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        Ok(())
    }
}

/// A batch of reports persisted as one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub results: Vec<ResourceReport>,
}

impl BatchReport {
    pub fn new(results: Vec<ResourceReport>) -> Self {
        Self {
            generated_at: chrono::Utc::now(),
            results,
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize batch report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write batch report to {}", path.display()))?;
        Ok(())
    }
}
