//! Container Sizer CLI
//!
//! A command-line tool for profiling container images against a local
//! Docker daemon and mapping their resource usage to cloud instance
//! size recommendations.

mod commands;
mod output;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sizer_lib::{DockerRuntime, RunManager, SamplerConfig};
use tracing_subscriber::EnvFilter;

/// Container Sizer CLI
#[derive(Parser)]
#[command(name = "sizer")]
#[command(author, version, about = "Profile containers and size cloud instances", long_about = None)]
pub struct Cli {
    /// Docker Engine API endpoint (can also be set via DOCKER_HOST)
    #[arg(long, env = "DOCKER_HOST", default_value = "http://localhost:2375")]
    pub docker_host: String,

    /// Seconds between samples
    #[arg(long, default_value_t = 1)]
    pub interval: u64,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Profile one image for a fixed duration and print a recommendation
    Estimate {
        /// Image reference (e.g. nginx:alpine)
        image: String,

        /// Profiling duration in seconds
        #[arg(long, short, default_value_t = 30)]
        duration: u64,

        /// Startup command override (whitespace-separated)
        #[arg(long, short)]
        command: Option<String>,

        /// Write the result as JSON to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Profile the default image roster (or a custom list)
    Bulk {
        /// Images to profile instead of the default roster
        #[arg(long, short)]
        images: Option<Vec<String>>,

        /// Per-image profiling duration in seconds
        #[arg(long, short, default_value_t = 20)]
        duration: u64,

        /// Write the batch report as JSON to this path
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Monitor an image live until interrupted with Ctrl-C
    Monitor {
        /// Image reference
        image: String,

        /// Startup command override (whitespace-separated)
        #[arg(long, short)]
        command: Option<String>,
    },
}

fn split_command(command: Option<String>) -> Option<Vec<String>> {
    command.map(|c| c.split_whitespace().map(|s| s.to_string()).collect())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let runtime = Arc::new(DockerRuntime::new(&cli.docker_host)?);
    let sampler = SamplerConfig {
        interval: Duration::from_secs(cli.interval.max(1)),
    };
    let manager = Arc::new(RunManager::new(runtime, sampler));

    match cli.command {
        Commands::Estimate {
            image,
            duration,
            command,
            report,
        } => {
            commands::estimate::run(
                manager,
                image,
                duration,
                split_command(command),
                report,
                cli.format,
            )
            .await?;
        }
        Commands::Bulk {
            images,
            duration,
            output,
        } => {
            commands::bulk::run(manager, images, duration, output, cli.format).await?;
        }
        Commands::Monitor { image, command } => {
            commands::monitor::run(manager, image, split_command(command), cli.format).await?;
        }
    }

    Ok(())
}
