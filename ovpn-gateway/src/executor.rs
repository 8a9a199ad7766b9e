// External command execution

//! External command execution
//!
//! Defines [`CommandExecutor`], the only way the rest of the crate talks to
//! the outside world. Production code uses [`ProcessExecutor`]; tests swap in
//! fakes that record argument vectors and answer from a script or a
//! simulated runtime.

use crate::error::GatewayError;
use crate::types::ExecutionResult;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Runs one program to completion and reports its exit status and output
///
/// A nonzero exit is a normal `Ok` result; `Err` means the program could not
/// be run at all (missing binary, timeout).
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `program` with `args` and wait for it to exit
    async fn execute(&self, program: &str, args: &[&str]) -> Result<ExecutionResult>;
}

/// Executor backed by real child processes
pub struct ProcessExecutor {
    timeout: Duration,
}

impl ProcessExecutor {
    /// Create an executor that kills any command running longer than `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, program: &str, args: &[&str]) -> Result<ExecutionResult> {
        log::debug!("exec: {} {}", program, args.join(" "));

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Dropping the pending future on timeout kills the child
        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(output) => output.with_context(|| format!("Failed to execute {}", program))?,
            Err(_) => {
                return Err(GatewayError::Timeout {
                    command: format!("{} {}", program, args.join(" ")),
                    limit: self.timeout,
                }
                .into())
            }
        };

        let result = ExecutionResult::from_output(&output);
        log::debug!("exec: {} exited with {}", program, result.status);
        Ok(result)
    }
}

/// Turn a nonzero exit status into a fatal [`GatewayError::StepFailed`]
pub fn ensure_success(step: impl ToString, result: ExecutionResult) -> Result<ExecutionResult> {
    if !result.success() {
        return Err(GatewayError::StepFailed {
            step: step.to_string(),
            status: result.status,
            stderr: result.stderr.trim().to_string(),
        }
        .into());
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: i32, stderr: &str) -> ExecutionResult {
        ExecutionResult {
            status,
            stdout: "out".to_string(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_ensure_success_passes_through() {
        let res = ensure_success("start", result(0, "")).unwrap();
        assert_eq!(res.stdout, "out");
    }

    #[test]
    fn test_ensure_success_classifies_failure() {
        let err = ensure_success("Creating volume", result(1, "  no space left\n")).unwrap_err();
        match err.downcast_ref::<GatewayError>() {
            Some(GatewayError::StepFailed {
                step,
                status,
                stderr,
            }) => {
                assert_eq!(step, "Creating volume");
                assert_eq!(*status, 1);
                assert_eq!(stderr, "no space left");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_executor_captures_output() {
        let exec = ProcessExecutor::new(Duration::from_secs(10));
        let res = exec
            .execute("sh", &["-c", "echo hello; echo oops >&2; exit 3"])
            .await
            .unwrap();
        assert_eq!(res.status, 3);
        assert_eq!(res.stdout, "hello\n");
        assert_eq!(res.stderr, "oops\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_executor_timeout() {
        let exec = ProcessExecutor::new(Duration::from_millis(100));
        let err = exec.execute("sleep", &["5"]).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GatewayError>(),
            Some(GatewayError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_process_executor_missing_binary() {
        let exec = ProcessExecutor::new(Duration::from_secs(10));
        let res = exec.execute("definitely-not-a-real-binary-4f1c", &[]).await;
        assert!(res.is_err());
    }
}
