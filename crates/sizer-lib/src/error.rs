//! Error taxonomy for profiling runs and the container runtime client
//!
//! Runs fail with exactly one structured cause so batch summaries can
//! classify failures by kind. Cleanup failures are deliberately absent
//! here: they are logged and swallowed, never promoted over the run's
//! primary outcome.

use thiserror::Error;

/// Terminal failure causes for a profiling run.
#[derive(Debug, Error)]
pub enum RunError {
    /// The target image could not be pulled from the registry.
    #[error("failed to pull image '{image}': {reason}")]
    ImagePull { image: String, reason: String },

    /// Every launch strategy in the fallback chain failed.
    #[error("failed to start container (tried: {attempted}): {reason}")]
    ContainerStart { attempted: String, reason: String },

    /// The run ended before a single valid sample pair was collected.
    /// Fatal: no recommendation is possible, and returning zeros instead
    /// would masquerade as a real measurement.
    #[error("no samples collected before the container stopped")]
    EmptyHistory,

    /// Collection failed before any samples existed. Once samples exist,
    /// collection errors are downgraded to early termination instead.
    #[error("stats collection failed: {0}")]
    Collection(String),
}

/// Errors from the container-runtime collaborator.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("image pull failed: {0}")]
    Pull(String),

    #[error("container start failed: {0}")]
    Start(String),

    /// The stats source has no more payloads (container gone).
    #[error("stats stream ended")]
    EndOfStream,

    #[error("malformed stats payload: {0}")]
    MalformedStats(String),

    #[error("container runtime request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected runtime response ({status}): {message}")]
    Api { status: u16, message: String },
}

impl RuntimeError {
    /// Whether this start failure is the "executable file not found"
    /// class that triggers the keep-alive fallback chain.
    pub fn is_executable_not_found(&self) -> bool {
        match self {
            RuntimeError::Start(msg) => msg.contains("executable file not found"),
            _ => false,
        }
    }
}
