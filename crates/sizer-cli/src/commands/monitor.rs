//! Live monitoring of a container until interrupted

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use sizer_lib::{RunManager, RunSpec, RunState};

use crate::output::{format_mb, format_percent, print_error, print_info, OutputFormat};

pub async fn run(
    manager: Arc<RunManager>,
    image: String,
    command: Option<Vec<String>>,
    format: OutputFormat,
) -> Result<()> {
    print_info(&format!("Monitoring {} (Ctrl-C to stop)...", image));

    let spec = RunSpec::new(image, None).with_command(command);
    let id = manager.start_run(spec);

    // Echo each new sample until the user interrupts or the run ends on
    // its own (container exit, stats stream drying up).
    let mut printed = 0u64;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                print_info("Stopping...");
                break;
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }

        let Some(snapshot) = manager.poll_run(&id).await else {
            bail!("run {id} disappeared from the registry");
        };
        if snapshot.state.is_terminal() {
            break;
        }
        if let Some(aggregate) = &snapshot.aggregate_so_far {
            if aggregate.sample_count > printed {
                printed = aggregate.sample_count;
                if let Some(sample) = &snapshot.last_sample {
                    let cpu = sample
                        .cpu_percent
                        .map(format_percent)
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "  cpu {:>8}  mem {:>10}",
                        cpu,
                        format_mb(sample.memory_mb)
                    );
                }
            }
        }
    }

    let record = match manager.stop_run(&id).await {
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
        bail!("monitoring failed");
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

    Ok(())
}
