//! Per-task attempt pipeline.
//!
//! A task runs through up to `max_retries + 1` attempts:
//!
//! ```text
//! cache hit? ──yes──> restore files, succeed
//!     │no
//!     v
//! generate ──err──┐
//!     │ok         │
//!     v           v
//! verify ──fail──> repair (optional) ──> next attempt
//!     │pass
//!     v
//! cache changed files, commit, succeed
//! ```
//!
//! Collaborator failures never escape: they become the execution's error
//! text and feed the retry loop.

use crate::collab::{Committer, Generator, Repairer, Verifier, VerifyOutcome};
use crate::config::OrchestratorConfig;
use crate::events::{EventEmitter, EventKind};
use crate::AgentError;
use chrono::{DateTime, Utc};
use sago_core::Task;
use sago_runtime::cache::{CachedResult, ResultCache, TaskFingerprint};
use sago_runtime::snapshot::{self, FileMap};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const SOURCE: &str = "attempt";

/// Output of the latest generation call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationResult {
    pub success: bool,
    pub files: FileMap,
    pub error: Option<String>,
}

impl GenerationResult {
    pub fn ok(files: FileMap) -> Self {
        Self {
            success: true,
            files,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            files: FileMap::new(),
            error: Some(error.into()),
        }
    }
}

/// Outcome of the latest verification run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResult {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl From<VerifyOutcome> for VerificationResult {
    fn from(outcome: VerifyOutcome) -> Self {
        Self {
            success: outcome.is_success(),
            exit_code: outcome.exit_code,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            timed_out: outcome.timed_out,
        }
    }
}

/// Per-run record of one task.
#[derive(Clone, Debug)]
pub struct TaskExecution {
    pub task: Arc<Task>,
    pub generation: Option<GenerationResult>,
    pub verification: Option<VerificationResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Attempts made beyond the first
    pub retry_count: u32,
    pub from_cache: bool,
    pub success: bool,
    /// Last failure text, cleared on success
    pub error: Option<String>,
    /// Declared or generated files whose content changed
    pub changed_files: Vec<String>,
}

impl TaskExecution {
    pub fn new(task: Arc<Task>) -> Self {
        Self {
            task,
            generation: None,
            verification: None,
            started_at: Utc::now(),
            finished_at: None,
            retry_count: 0,
            from_cache: false,
            success: false,
            error: None,
            changed_files: Vec::new(),
        }
    }

    /// A finished, failed execution that never reached a collaborator.
    pub fn failed(task: Arc<Task>, error: impl Into<String>) -> Self {
        let mut execution = Self::new(task);
        execution.error = Some(error.into());
        execution.finish();
        execution
    }

    fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Wall-clock time from start to finish (zero while running).
    pub fn duration(&self) -> Duration {
        self.finished_at
            .and_then(|end| (end - self.started_at).to_std().ok())
            .unwrap_or_default()
    }
}

/// Knobs the attempt loop reads from [`OrchestratorConfig`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttemptSettings {
    /// Generation attempts per task, first try included
    pub max_attempts: u32,
    pub verify: bool,
    pub verify_timeout: Duration,
    pub task_timeout: Duration,
    pub self_heal: bool,
}

impl From<&OrchestratorConfig> for AttemptSettings {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            max_attempts: config.max_attempts(),
            verify: config.verify,
            verify_timeout: config.verify_timeout(),
            task_timeout: config.task_timeout(),
            self_heal: config.self_heal,
        }
    }
}

/// Runs single tasks through the attempt pipeline.
///
/// Cheap to clone; collaborators are shared.
#[derive(Clone)]
pub struct AttemptCoordinator {
    root: PathBuf,
    settings: AttemptSettings,
    generator: Arc<dyn Generator>,
    verifier: Arc<dyn Verifier>,
    repairer: Option<Arc<dyn Repairer>>,
    committer: Option<Arc<dyn Committer>>,
    cache: Option<ResultCache>,
    events: EventEmitter,
}

impl AttemptCoordinator {
    pub fn new(
        root: impl Into<PathBuf>,
        settings: AttemptSettings,
        generator: Arc<dyn Generator>,
        verifier: Arc<dyn Verifier>,
        events: EventEmitter,
    ) -> Self {
        Self {
            root: root.into(),
            settings,
            generator,
            verifier,
            repairer: None,
            committer: None,
            cache: None,
            events,
        }
    }

    pub fn with_repairer(mut self, repairer: Arc<dyn Repairer>) -> Self {
        self.repairer = Some(repairer);
        self
    }

    pub fn with_committer(mut self, committer: Arc<dyn Committer>) -> Self {
        self.committer = Some(committer);
        self
    }

    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> &AttemptSettings {
        &self.settings
    }

    /// Runs `task` to a terminal state.
    pub async fn run(&self, task: Arc<Task>) -> TaskExecution {
        let mut execution = TaskExecution::new(task.clone());
        tracing::info!("Executing task {}: {}", task.id, task.name);
        self.emit(EventKind::TaskStarted, &task, json!({})).await;

        let before = snapshot::read_files(&self.root, &task.files).await;
        let cache_key = self
            .cache
            .as_ref()
            .map(|_| TaskFingerprint::new(&task, &before).key());

        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(hit) = cache.get(key).await.filter(|hit| hit.success) {
                let restored = snapshot::write_files(&self.root, &hit.files).await;
                match restored {
                    Ok(restored) => {
                        tracing::info!("Task {} served from cache", task.id);
                        execution.from_cache = true;
                        execution.success = true;
                        execution.changed_files = restored;
                        execution.generation = Some(GenerationResult::ok(hit.files));
                        execution.finish();
                        self.emit(EventKind::CacheHit, &task, json!({ "cache_key": key.short() }))
                            .await;
                        return execution;
                    }
                    Err(e) => {
                        tracing::warn!("Could not restore cached files for {}: {}", task.id, e);
                    }
                }
            }
        }

        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            execution.retry_count = attempt - 1;
            if attempt > 1 {
                tracing::info!("Retrying task {} ({}/{})", task.id, attempt, max_attempts);
            }

            let (failure, diagnostics) = match self.attempt_once(&task, &mut execution).await {
                Ok(()) => break,
                Err(failed) => failed,
            };

            tracing::warn!("Task {} attempt {} failed: {}", task.id, attempt, failure);
            execution.error = Some(failure.clone());

            if attempt >= max_attempts {
                break;
            }
            if self.settings.self_heal {
                self.try_repair(&task, &failure, &diagnostics).await;
            }
        }

        if execution.success {
            self.on_success(&task, &before, cache_key.as_ref(), &mut execution)
                .await;
        } else {
            tracing::error!(
                "Task {} failed after {} attempts",
                task.id,
                execution.retry_count + 1
            );
            self.emit(
                EventKind::TaskFailed,
                &task,
                json!({
                    "error": execution.error,
                    "retry_count": execution.retry_count,
                }),
            )
            .await;
        }

        execution.finish();
        execution
    }

    /// One generate-then-verify pass.
    ///
    /// On failure returns the error text and any verifier diagnostics.
    async fn attempt_once(
        &self,
        task: &Task,
        execution: &mut TaskExecution,
    ) -> std::result::Result<(), (String, String)> {
        let current = snapshot::read_files(&self.root, &task.files).await;
        let context = snapshot::render_files(&current);

        let files = match self.generate(task, &context).await {
            Ok(files) => files,
            Err(failure) => {
                execution.generation = Some(GenerationResult::failed(failure.clone()));
                self.emit(EventKind::GenerationFailed, task, json!({ "error": failure }))
                    .await;
                return Err((failure, String::new()));
            }
        };

        if let Err(e) = snapshot::write_files(&self.root, &files).await {
            let failure = format!("generation failed: {}", e);
            execution.generation = Some(GenerationResult::failed(failure.clone()));
            self.emit(EventKind::GenerationFailed, task, json!({ "error": failure }))
                .await;
            return Err((failure, String::new()));
        }
        execution.generation = Some(GenerationResult::ok(files));

        if !self.settings.verify {
            execution.success = true;
            execution.error = None;
            return Ok(());
        }

        let outcome = self
            .verifier
            .verify(&task.verify, &self.root, self.settings.verify_timeout)
            .await;
        let result = VerificationResult::from(outcome);
        execution.verification = Some(result.clone());

        if result.success {
            execution.success = true;
            execution.error = None;
            return Ok(());
        }

        let failure = verification_failure(&result, self.settings.verify_timeout);
        let diagnostics = format!("STDOUT:\n{}\n\nSTDERR:\n{}", result.stdout, result.stderr);
        self.emit(
            EventKind::VerificationFailed,
            task,
            json!({
                "exit_code": result.exit_code,
                "timed_out": result.timed_out,
                "error": failure,
            }),
        )
        .await;
        Err((failure, diagnostics))
    }

    async fn generate(&self, task: &Task, context: &str) -> std::result::Result<FileMap, String> {
        let limit = self.settings.task_timeout;
        match tokio::time::timeout(limit, self.generator.generate(task, context)).await {
            Ok(Ok(files)) => Ok(files),
            Ok(Err(AgentError::Generation(msg))) => Err(format!("generation failed: {}", msg)),
            Ok(Err(e)) => Err(format!("generation failed: {}", e)),
            Err(_) => Err(format!("generation timed out after {}s", limit.as_secs())),
        }
    }

    /// Consults the repairer and applies its patch. Returns whether files changed.
    async fn try_repair(&self, task: &Task, failure: &str, diagnostics: &str) -> bool {
        let Some(repairer) = &self.repairer else {
            return false;
        };

        if !repairer.should_repair(failure, task).await {
            tracing::info!("Error for task {} is not repairable", task.id);
            return false;
        }

        let original = snapshot::read_files(&self.root, &task.files).await;
        let limit = self.settings.task_timeout;
        let patch = match tokio::time::timeout(
            limit,
            repairer.repair(task, failure, &original, diagnostics),
        )
        .await
        {
            Ok(Some(patch)) => patch,
            Ok(None) => {
                tracing::info!("No repair available for task {}", task.id);
                return false;
            }
            Err(_) => {
                tracing::warn!("Repair for task {} timed out after {}s", task.id, limit.as_secs());
                return false;
            }
        };

        match snapshot::write_files(&self.root, &patch).await {
            Ok(written) => {
                tracing::info!("Applied repair to {} files for task {}", written.len(), task.id);
                self.emit(EventKind::RepairApplied, task, json!({ "files": written }))
                    .await;
                true
            }
            Err(e) => {
                tracing::warn!("Could not apply repair for task {}: {}", task.id, e);
                false
            }
        }
    }

    async fn on_success(
        &self,
        task: &Task,
        before: &FileMap,
        cache_key: Option<&sago_runtime::CacheKey>,
        execution: &mut TaskExecution,
    ) {
        let mut tracked = task.files.clone();
        if let Some(generation) = &execution.generation {
            for path in generation.files.keys() {
                if !tracked.contains(path) {
                    tracked.push(path.clone());
                }
            }
        }
        let after = snapshot::read_files(&self.root, &tracked).await;
        let changed = snapshot::changed_files(before, &after);
        execution.changed_files = changed.keys().cloned().collect();

        if let (Some(cache), Some(key)) = (&self.cache, cache_key) {
            let cached = CachedResult::success(changed)
                .with_metadata(json!({ "retry_count": execution.retry_count }));
            cache.put(key, &cached).await;
        }

        if let Some(committer) = &self.committer {
            if !committer
                .commit(&task.id, &task.name, &execution.changed_files)
                .await
            {
                tracing::warn!("Commit skipped or failed for task {}", task.id);
            }
        }

        tracing::info!("Task {} succeeded", task.id);
        self.emit(
            EventKind::TaskSucceeded,
            task,
            json!({
                "retry_count": execution.retry_count,
                "changed_files": execution.changed_files,
            }),
        )
        .await;
    }

    async fn emit(&self, kind: EventKind, task: &Task, data: serde_json::Value) {
        let mut payload = json!({
            "task_id": task.id.as_str(),
            "task_name": task.name,
        });
        if let (Some(target), serde_json::Value::Object(extra)) = (payload.as_object_mut(), data) {
            target.extend(extra);
        }
        self.events.emit(kind, SOURCE, payload).await;
    }
}

/// Failure text for a failed verification.
fn verification_failure(result: &VerificationResult, limit: Duration) -> String {
    if result.timed_out {
        return format!("verification timed out after {}s", limit.as_secs());
    }
    let detail = if result.stderr.trim().is_empty() {
        result.stdout.trim()
    } else {
        result.stderr.trim()
    };
    format!("verification failed (exit {}): {}", result.exit_code, detail)
}
