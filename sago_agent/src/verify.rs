//! Shell verification - Runs a task's verify command.
//!
//! The command runs through `sh -c` in the project root with a hard
//! wall-clock limit. A timeout kills the child and is reported as a failing
//! outcome, never as an error.

use crate::collab::{Verifier, VerifyOutcome};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Stdout reported when a task has no verify command.
pub const NO_COMMAND: &str = "No verification command specified";

/// Verifier backed by the system shell.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShellVerifier;

impl ShellVerifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Verifier for ShellVerifier {
    async fn verify(&self, command: &str, cwd: &Path, timeout: Duration) -> VerifyOutcome {
        let command = command.trim();
        if command.is_empty() {
            return VerifyOutcome::passed(NO_COMMAND);
        }

        tracing::info!("Running verification: {}", command);

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                tracing::error!("Failed to spawn verification: {}", e);
                return VerifyOutcome {
                    exit_code: -1,
                    stderr: format!("Failed to run verification: {}", e),
                    ..Default::default()
                };
            }
        };

        // Dropping the future on timeout drops the child, which kills it.
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let outcome = VerifyOutcome {
                    exit_code: output.status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    timed_out: false,
                };
                if outcome.is_success() {
                    tracing::info!("Verification passed");
                } else {
                    tracing::warn!("Verification failed with exit code {}", outcome.exit_code);
                }
                outcome
            }
            Ok(Err(e)) => VerifyOutcome {
                exit_code: -1,
                stderr: format!("Failed to run verification: {}", e),
                ..Default::default()
            },
            Err(_) => {
                tracing::warn!("Verification timed out after {}s", timeout.as_secs());
                VerifyOutcome {
                    exit_code: -1,
                    stderr: format!("Verification timed out after {}s", timeout.as_secs()),
                    timed_out: true,
                    ..Default::default()
                }
            }
        }
    }
}
