//! Container runtime interface
//!
//! The sampling engine never talks to Docker directly; it consumes this
//! trait so runs can be driven against a real daemon or a mock in tests.

mod docker;

pub use docker::DockerRuntime;

use crate::error::RuntimeError;
use crate::models::{PortMapping, StatsSnapshot};

pub use async_trait::async_trait;

/// Opaque handle to a launched (or attached) container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
}

impl ContainerHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Short identifier for log output.
    pub fn short_id(&self) -> &str {
        let end = self.id.len().min(12);
        &self.id[..end]
    }
}

/// Live status of a container as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    Exited,
    Other(String),
}

impl ContainerState {
    pub fn is_running(&self) -> bool {
        matches!(self, ContainerState::Running)
    }
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerState::Running => f.write_str("running"),
            ContainerState::Exited => f.write_str("exited"),
            ContainerState::Other(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ContainerState {
    fn from(status: &str) -> Self {
        match status {
            "running" => ContainerState::Running,
            "exited" => ContainerState::Exited,
            other => ContainerState::Other(other.to_string()),
        }
    }
}

/// External container-runtime collaborator.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Ensure the image is available locally, pulling it if absent.
    async fn resolve_image(&self, image: &str) -> Result<(), RuntimeError>;

    /// Create and start a detached container. `command` overrides the
    /// image entrypoint command when given.
    async fn start_container(
        &self,
        image: &str,
        command: Option<&[String]>,
        ports: Option<&[PortMapping]>,
    ) -> Result<ContainerHandle, RuntimeError>;

    /// Query the container's live status.
    async fn status(&self, handle: &ContainerHandle) -> Result<ContainerState, RuntimeError>;

    /// Fetch one raw stats snapshot.
    async fn stats(&self, handle: &ContainerHandle) -> Result<StatsSnapshot, RuntimeError>;

    /// Stop and remove the container. Callers treat failures as
    /// best-effort and never propagate them.
    async fn stop_and_remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError>;

    /// Tail of the container's combined stdout/stderr.
    async fn logs(&self, handle: &ContainerHandle, tail: usize) -> Result<String, RuntimeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_state_parsing() {
        assert_eq!(ContainerState::from("running"), ContainerState::Running);
        assert_eq!(ContainerState::from("exited"), ContainerState::Exited);
        assert_eq!(
            ContainerState::from("restarting"),
            ContainerState::Other("restarting".to_string())
        );
    }

    #[test]
    fn test_short_id() {
        let handle = ContainerHandle::new("0123456789abcdef0123");
        assert_eq!(handle.short_id(), "0123456789ab");

        let short = ContainerHandle::new("abc");
        assert_eq!(short.short_id(), "abc");
    }
}
