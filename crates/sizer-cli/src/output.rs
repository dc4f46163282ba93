//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use sizer_lib::{RunRecord, SizingRecommendation};
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a CPU percentage for display
pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value)
}

/// Format megabytes, switching to GiB past 1024
pub fn format_mb(mb: f64) -> String {
    if mb >= 1024.0 {
        format!("{:.2}Gi", mb / 1024.0)
    } else {
        format!("{:.1}Mi", mb)
    }
}

/// Color a run state based on where it sits in the lifecycle
pub fn color_state(state: &str) -> String {
    match state {
        "completed" | "running" => state.green().to_string(),
        "collecting" | "resolving" | "starting" => state.blue().to_string(),
        "stopping" | "finalizing" => state.yellow().to_string(),
        "failed" => state.red().to_string(),
        _ => state.to_string(),
    }
}

/// Row for the usage summary table
#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Average")]
    average: String,
    #[tabled(rename = "Peak")]
    peak: String,
}

/// Row for the instance recommendation table
#[derive(Tabled)]
struct InstanceRow {
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "Instance")]
    instance: String,
}

/// Print the usage summary of a completed run
pub fn print_summary(record: &RunRecord) {
    let Some(stats) = &record.stats else {
        print_warning("No statistics available");
        return;
    };

    println!();
    println!(
        "{} {} ({} samples over {:.0}s)",
        "Image:".bold(),
        record.image,
        stats.sample_count,
        stats.duration_secs
    );

    let rows = vec![
        SummaryRow {
            metric: "CPU".to_string(),
            average: format_percent(stats.cpu_avg),
            peak: format_percent(stats.cpu_peak),
        },
        SummaryRow {
            metric: "Memory".to_string(),
            average: format_mb(stats.mem_avg_mb),
            peak: format_mb(stats.mem_peak_mb),
        },
    ];
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print the instance recommendation of a completed run
pub fn print_recommendation(recommendation: &SizingRecommendation) {
    println!();
    println!(
        "{} {} vCPU, {} GB RAM",
        "Recommended:".bold(),
        recommendation.vcpu,
        recommendation.ram_gb
    );

    let rows = vec![
        InstanceRow {
            provider: "AWS".to_string(),
            instance: recommendation.instances.aws.clone(),
        },
        InstanceRow {
            provider: "GCP".to_string(),
            instance: recommendation.instances.gcp.clone(),
        },
        InstanceRow {
            provider: "Azure".to_string(),
            instance: recommendation.instances.azure.clone(),
        },
    ];
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mb_switches_units() {
        assert_eq!(format_mb(512.0), "512.0Mi");
        assert_eq!(format_mb(2048.0), "2.00Gi");
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(12.34), "12.3%");
    }
}
