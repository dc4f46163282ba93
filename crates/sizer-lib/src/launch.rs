//! Launch strategies
//!
//! The retry policy for starting a profiling container is data, not
//! control flow: an ordered list of candidate commands tried by a single
//! combinator. When no custom command is supplied the chain keeps the
//! container's main process alive so it can be profiled at all.

use tracing::{debug, warn};

use crate::error::{RunError, RuntimeError};
use crate::models::PortMapping;
use crate::runtime::{ContainerHandle, ContainerRuntime};

/// One candidate launch command. `command: None` means the image's own
/// default command, with no override.
#[derive(Debug, Clone)]
pub struct LaunchAttempt {
    pub label: &'static str,
    pub command: Option<Vec<String>>,
}

impl LaunchAttempt {
    fn new(label: &'static str, command: &[&str]) -> Self {
        Self {
            label,
            command: Some(command.iter().map(|s| s.to_string()).collect()),
        }
    }

    fn image_default() -> Self {
        Self {
            label: "image default",
            command: None,
        }
    }
}

/// Ordered list of launch candidates for one run.
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    attempts: Vec<LaunchAttempt>,
}

impl LaunchPlan {
    /// A custom command is tried exactly once; without one, the keep-alive
    /// fallback chain applies.
    pub fn for_command(custom: Option<Vec<String>>) -> Self {
        match custom {
            Some(command) => Self {
                attempts: vec![LaunchAttempt {
                    label: "custom",
                    command: Some(command),
                }],
            },
            None => Self::keep_alive_chain(),
        }
    }

    /// The documented fallback chain: infinite-tail keep-alive, infinite
    /// sleep, shell-wrapped infinite sleep, then the image default.
    pub fn keep_alive_chain() -> Self {
        Self {
            attempts: vec![
                LaunchAttempt::new("tail -f /dev/null", &["tail", "-f", "/dev/null"]),
                LaunchAttempt::new("sleep infinity", &["sleep", "infinity"]),
                LaunchAttempt::new(
                    "/bin/sh -c 'sleep infinity'",
                    &["/bin/sh", "-c", "sleep infinity"],
                ),
                LaunchAttempt::image_default(),
            ],
        }
    }

    pub fn attempts(&self) -> &[LaunchAttempt] {
        &self.attempts
    }

    /// Try each candidate in order; first success wins.
    ///
    /// The chain only advances past the first attempt when it failed with
    /// the "executable not found" class of error; any other first-attempt
    /// failure (and any custom-command failure) aborts immediately.
    pub async fn launch(
        &self,
        runtime: &dyn ContainerRuntime,
        image: &str,
        ports: Option<&[PortMapping]>,
    ) -> Result<(ContainerHandle, String), RunError> {
        let mut attempted: Vec<&str> = Vec::new();
        let mut last_error: Option<RuntimeError> = None;

        for (index, attempt) in self.attempts.iter().enumerate() {
            attempted.push(attempt.label);
            debug!(image = %image, command = %attempt.label, "Launching container");

            match runtime
                .start_container(image, attempt.command.as_deref(), ports)
                .await
            {
                Ok(handle) => return Ok((handle, attempt.label.to_string())),
                Err(err) => {
                    let more_attempts = index + 1 < self.attempts.len();
                    let retryable = more_attempts && (index > 0 || err.is_executable_not_found());
                    if retryable {
                        warn!(
                            image = %image,
                            command = %attempt.label,
                            error = %err,
                            "Launch attempt failed, trying next candidate"
                        );
                        last_error = Some(err);
                        continue;
                    }
                    return Err(RunError::ContainerStart {
                        attempted: attempted.join(", "),
                        reason: err.to_string(),
                    });
                }
            }
        }

        Err(RunError::ContainerStart {
            attempted: attempted.join(", "),
            reason: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no launch candidates".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StatsSnapshot;
    use crate::runtime::{async_trait, ContainerState};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Runtime whose start_container fails a scripted number of times.
    struct ScriptedRuntime {
        start_errors: Mutex<Vec<RuntimeError>>,
        starts: AtomicUsize,
        commands_seen: Mutex<Vec<Option<Vec<String>>>>,
    }

    impl ScriptedRuntime {
        fn failing_with(errors: Vec<RuntimeError>) -> Self {
            Self {
                start_errors: Mutex::new(errors),
                starts: AtomicUsize::new(0),
                commands_seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ContainerRuntime for ScriptedRuntime {
        async fn resolve_image(&self, _image: &str) -> Result<(), RuntimeError> {
            Ok(())
        }

        async fn start_container(
            &self,
            _image: &str,
            command: Option<&[String]>,
            _ports: Option<&[PortMapping]>,
        ) -> Result<ContainerHandle, RuntimeError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.commands_seen
                .lock()
                .unwrap()
                .push(command.map(|c| c.to_vec()));

            let mut errors = self.start_errors.lock().unwrap();
            if errors.is_empty() {
                Ok(ContainerHandle::new("scripted"))
            } else {
                Err(errors.remove(0))
            }
        }

        async fn status(&self, _handle: &ContainerHandle) -> Result<ContainerState, RuntimeError> {
            Ok(ContainerState::Running)
        }

        async fn stats(&self, _handle: &ContainerHandle) -> Result<StatsSnapshot, RuntimeError> {
            Err(RuntimeError::EndOfStream)
        }

        async fn stop_and_remove(&self, _handle: &ContainerHandle) -> Result<(), RuntimeError> {
            Ok(())
        }

        async fn logs(&self, _handle: &ContainerHandle, _tail: usize) -> Result<String, RuntimeError> {
            Ok(String::new())
        }
    }

    fn exec_not_found() -> RuntimeError {
        RuntimeError::Start("executable file not found in $PATH".to_string())
    }

    #[tokio::test]
    async fn test_first_candidate_succeeds() {
        let runtime = ScriptedRuntime::failing_with(vec![]);
        let plan = LaunchPlan::for_command(None);

        let (_, label) = plan.launch(&runtime, "alpine", None).await.unwrap();
        assert_eq!(label, "tail -f /dev/null");
        assert_eq!(runtime.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fallback_chain_advances_on_missing_executable() {
        let runtime =
            ScriptedRuntime::failing_with(vec![exec_not_found(), exec_not_found()]);
        let plan = LaunchPlan::for_command(None);

        let (_, label) = plan.launch(&runtime, "scratchy", None).await.unwrap();
        assert_eq!(label, "/bin/sh -c 'sleep infinity'");
        assert_eq!(runtime.starts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_final_candidate_is_image_default() {
        let runtime = ScriptedRuntime::failing_with(vec![
            exec_not_found(),
            exec_not_found(),
            exec_not_found(),
        ]);
        let plan = LaunchPlan::for_command(None);

        let (_, label) = plan.launch(&runtime, "scratchy", None).await.unwrap();
        assert_eq!(label, "image default");

        // Fourth attempt carries no command override.
        let seen = runtime.commands_seen.lock().unwrap();
        assert_eq!(seen[3], None);
    }

    #[tokio::test]
    async fn test_all_candidates_failing_reports_chain() {
        let runtime = ScriptedRuntime::failing_with(vec![
            exec_not_found(),
            exec_not_found(),
            exec_not_found(),
            RuntimeError::Start("image has no command".to_string()),
        ]);
        let plan = LaunchPlan::for_command(None);

        let err = plan.launch(&runtime, "scratchy", None).await.unwrap_err();
        match err {
            RunError::ContainerStart { attempted, reason } => {
                assert!(attempted.contains("tail -f /dev/null"));
                assert!(attempted.contains("image default"));
                assert!(reason.contains("image has no command"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unrelated_first_failure_does_not_retry() {
        let runtime = ScriptedRuntime::failing_with(vec![RuntimeError::Start(
            "port is already allocated".to_string(),
        )]);
        let plan = LaunchPlan::for_command(None);

        let err = plan.launch(&runtime, "nginx", None).await.unwrap_err();
        assert!(matches!(err, RunError::ContainerStart { .. }));
        assert_eq!(runtime.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_custom_command_never_falls_back() {
        let runtime = ScriptedRuntime::failing_with(vec![exec_not_found()]);
        let plan = LaunchPlan::for_command(Some(vec!["redis-server".to_string()]));

        let err = plan.launch(&runtime, "redis", None).await.unwrap_err();
        assert!(matches!(err, RunError::ContainerStart { .. }));
        assert_eq!(runtime.starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_chain_order() {
        let plan = LaunchPlan::keep_alive_chain();
        let labels: Vec<_> = plan.attempts().iter().map(|a| a.label).collect();
        assert_eq!(
            labels,
            vec![
                "tail -f /dev/null",
                "sleep infinity",
                "/bin/sh -c 'sleep infinity'",
                "image default",
            ]
        );
    }
}
