//! Bulk campaign over a roster of images

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use colored::Colorize;
use sizer_lib::{
    report::BatchReport, BulkRunner, BulkStatus, ResourceReport, RunManager, RunState,
};
use tabled::{settings::Style, Table, Tabled};

use crate::output::{color_state, print_info, print_success, print_warning, OutputFormat};

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Image")]
    image: String,
    #[tabled(rename = "Description")]
    description: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "CPU Peak")]
    cpu_peak: String,
    #[tabled(rename = "Mem Peak")]
    mem_peak: String,
    #[tabled(rename = "AWS")]
    aws: String,
}

pub async fn run(
    manager: Arc<RunManager>,
    images: Option<Vec<String>>,
    duration_secs: u64,
    output: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let runner = Arc::new(BulkRunner::new(manager.clone()));
    let duration = Duration::from_secs(duration_secs);

    if !runner.start(images, duration).await {
        bail!("a bulk campaign is already running");
    }

    // Poll progress, reporting each image as it lands.
    let mut reported = 0usize;
    let progress = loop {
        let progress = runner.progress().await;
        for outcome in &progress.outcomes[reported..] {
            match outcome.state {
                RunState::Completed => print_info(&format!("{} done", outcome.image)),
                _ => print_warning(&format!("{} failed", outcome.image)),
            }
        }
        reported = progress.outcomes.len();

        if progress.status == BulkStatus::Completed {
            break progress;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&progress)?);
        }
        OutputFormat::Table => {
            let rows: Vec<OutcomeRow> = progress
                .outcomes
                .iter()
                .map(|o| OutcomeRow {
                    image: o.image.clone(),
                    description: o.description.clone().unwrap_or_else(|| "-".to_string()),
                    state: color_state(&o.state.to_string()),
                    cpu_peak: o
                        .cpu_peak
                        .map(|v| format!("{:.1}%", v))
                        .unwrap_or_else(|| "-".to_string()),
                    mem_peak: o
                        .mem_peak_mb
                        .map(|v| format!("{:.1}Mi", v))
                        .unwrap_or_else(|| "-".to_string()),
                    aws: o
                        .recommendation
                        .as_ref()
                        .map(|r| r.instances.aws.clone())
                        .unwrap_or_else(|| "-".to_string()),
                })
                .collect();
            let table = Table::new(rows).with(Style::rounded()).to_string();
            println!("{}", table);

            let failed = progress
                .outcomes
                .iter()
                .filter(|o| o.state == RunState::Failed)
                .count();
            println!(
                "\n{} {} profiled, {} failed",
                "Total:".bold(),
                progress.total,
                failed
            );
        }
    }

    if let Some(path) = output {
        // Failures carry no aggregate; persist the completed ones. The
        // campaign is finished, so every record is terminal by now.
        let mut results = Vec::new();
        for id in manager.list_runs() {
            if let Some(record) = manager.get_result(&id).await {
                if record.state == RunState::Completed {
                    results.push(ResourceReport::from_record(&record)?);
                }
            }
        }
        BatchReport::new(results).write_json(&path)?;
        print_success(&format!("Batch report written to {}", path.display()));
    }

    Ok(())
}
