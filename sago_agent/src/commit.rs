//! Git commits for finished tasks.
//!
//! Each successful task is committed as `<task_id>: <task_name>` with only
//! the files it changed staged. Every failure returns `false`.

use crate::collab::Committer;
use async_trait::async_trait;
use sago_core::TaskId;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Committer that shells out to `git` in the project root.
#[derive(Clone, Debug)]
pub struct GitCommitter {
    root: PathBuf,
}

impl GitCommitter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn git(&self, args: &[&str]) -> bool {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => true,
            Ok(output) => {
                tracing::debug!(
                    "git {} failed: {}",
                    args.first().copied().unwrap_or_default(),
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                false
            }
            Err(e) => {
                tracing::debug!("Could not run git: {}", e);
                false
            }
        }
    }

    /// Whether the root is inside a git work tree.
    pub async fn is_repository(&self) -> bool {
        self.git(&["rev-parse", "--is-inside-work-tree"]).await
    }
}

#[async_trait]
impl Committer for GitCommitter {
    async fn commit(&self, task_id: &TaskId, task_name: &str, changed_files: &[String]) -> bool {
        if changed_files.is_empty() {
            tracing::debug!("Nothing to commit for task {}", task_id);
            return false;
        }
        if !self.is_repository().await {
            tracing::debug!("{} is not a git repository", self.root.display());
            return false;
        }

        let mut add = vec!["add", "--"];
        add.extend(changed_files.iter().map(String::as_str));
        if !self.git(&add).await {
            tracing::warn!("git add failed for task {}", task_id);
            return false;
        }

        let message = format!("{}: {}", task_id, task_name);
        if !self.git(&["commit", "-m", &message]).await {
            tracing::warn!("git commit failed for task {}", task_id);
            return false;
        }

        tracing::info!("Committed task {}", task_id);
        true
    }
}
