//! Collaborator interfaces.
//!
//! The work itself (producing file content, running checks, patching
//! failures, committing) happens outside this crate. Each concern is one
//! narrow trait so implementations can be swapped or scripted in tests.

use crate::events::EventKind;
use crate::Result;
use async_trait::async_trait;
use sago_core::{Task, TaskId};
use sago_runtime::FileMap;
use std::path::Path;
use std::time::Duration;

/// Turns a task description into file content.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produces the files for `task`.
    ///
    /// `context` holds the current content of the task's existing files as
    /// `=== path ===` blocks.
    async fn generate(&self, task: &Task, context: &str) -> Result<FileMap>;
}

/// Result of running a verification command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl VerifyOutcome {
    /// A passing outcome with the given stdout.
    pub fn passed(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Runs a verification command.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, command: &str, cwd: &Path, timeout: Duration) -> VerifyOutcome;
}

/// Classifies failures and proposes patches.
#[async_trait]
pub trait Repairer: Send + Sync {
    /// Whether `error` looks fixable for this task.
    async fn should_repair(&self, error: &str, task: &Task) -> bool;

    /// Returns patched files, or `None` when no fix applies.
    async fn repair(
        &self,
        task: &Task,
        error: &str,
        original_files: &FileMap,
        diagnostics: &str,
    ) -> Option<FileMap>;
}

/// Best-effort version-control snapshot of a finished task.
#[async_trait]
pub trait Committer: Send + Sync {
    async fn commit(&self, task_id: &TaskId, task_name: &str, changed_files: &[String]) -> bool;
}

/// Passive observer of orchestration events.
///
/// Fire-and-forget: implementations must not fail the caller.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn record_event(&self, kind: EventKind, source: &str, payload: serde_json::Value);
}
