//! Core library for container resource sizing
//!
//! This crate provides the core functionality for:
//! - Sampling CPU and memory usage of running containers
//! - Aggregating sample histories into summary statistics
//! - Mapping peak usage to cloud instance recommendations
//! - Orchestrating profiling runs end-to-end
//! - Bulk campaigns over a roster of well-known images

pub mod aggregate;
pub mod bulk;
pub mod collector;
pub mod error;
pub mod launch;
pub mod models;
pub mod observability;
pub mod recommend;
pub mod report;
pub mod run;
pub mod runtime;
pub mod stats;

pub use bulk::{BulkOutcome, BulkProgress, BulkRunner, BulkStatus, TestImage, DEFAULT_TEST_IMAGES};
pub use collector::{SamplerConfig, DEFAULT_SAMPLE_INTERVAL};
pub use error::{RunError, RuntimeError};
pub use models::*;
pub use observability::SizerMetrics;
pub use report::ResourceReport;
pub use run::{RunId, RunManager, RunRecord, RunSnapshot, RunSpec};
pub use runtime::{ContainerHandle, ContainerRuntime, ContainerState, DockerRuntime};
