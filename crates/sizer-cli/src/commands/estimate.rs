//! One-shot profiling of a single image

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use sizer_lib::{ResourceReport, RunManager, RunSpec, RunState};

use crate::output::{print_error, print_info, print_success, OutputFormat};

pub async fn run(
    manager: Arc<RunManager>,
    image: String,
    duration_secs: u64,
    command: Option<Vec<String>>,
    report_path: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    print_info(&format!(
        "Profiling {} for {}s...",
        image, duration_secs
    ));

    let spec = RunSpec::new(image, Some(Duration::from_secs(duration_secs)))
        .with_command(command);
    let id = manager.start_run(spec);

    let record = match manager.wait(&id).await {
        Some(record) => record,
        None => bail!("run {id} disappeared from the registry"),
    };

    if record.state == RunState::Failed {
        let message = record
            .failure
            .as_ref()
            .map(|f| f.message.clone())
            .unwrap_or_else(|| "unknown failure".to_string());
        print_error(&message);
        bail!("profiling failed");
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        OutputFormat::Table => {
            crate::output::print_summary(&record);
            if let Some(recommendation) = &record.recommendation {
                crate::output::print_recommendation(recommendation);
            }
        }
    }

    if let Some(path) = report_path {
        let report = ResourceReport::from_record(&record)?;
        report.write_json(&path)?;
        print_success(&format!("Report written to {}", path.display()));
    }

    Ok(())
}
