//! Top-level execution coordinator.
//!
//! Resolves the plan into waves once, runs the waves in order and records
//! every task outcome in the progress log. A failing wave stops the run
//! unless `continue_on_failure` is set; tasks in waves that never ran are
//! counted as skipped.

use crate::attempt::{AttemptCoordinator, AttemptSettings, TaskExecution};
use crate::collab::{Committer, EventSink, Generator, Repairer, Verifier};
use crate::commit::GitCommitter;
use crate::config::OrchestratorConfig;
use crate::events::{EventEmitter, EventKind, JsonlEventSink, NoopEventSink};
use crate::verify::ShellVerifier;
use crate::wave::WaveExecutor;
use crate::Result;
use sago_core::{DependencyResolver, Phase, PlanSource, Task, TaskId, Wave};
use sago_runtime::{ProgressLog, ResultCache};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

const SOURCE: &str = "coordinator";

/// Aggregate outcome of one run.
#[derive(Clone, Debug)]
pub struct WorkflowResult {
    pub run_id: Uuid,
    /// No failed task and no run-level error
    pub success: bool,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    /// Tasks never attempted: later waves after a stop, or already passed on resume
    pub skipped_tasks: usize,
    pub duration: Duration,
    /// In wave order
    pub executions: Vec<TaskExecution>,
    /// Run-level failure such as a dependency cycle
    pub error: Option<String>,
}

impl WorkflowResult {
    fn aborted(run_id: Uuid, total_tasks: usize, error: String, duration: Duration) -> Self {
        Self {
            run_id,
            success: false,
            total_tasks,
            completed_tasks: 0,
            failed_tasks: 0,
            skipped_tasks: total_tasks,
            duration,
            executions: Vec::new(),
            error: Some(error),
        }
    }

    pub fn failed_executions(&self) -> impl Iterator<Item = &TaskExecution> {
        self.executions.iter().filter(|e| !e.success)
    }

    /// Serializable view of the result.
    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary {
            run_id: self.run_id.to_string(),
            success: self.success,
            total_tasks: self.total_tasks,
            completed_tasks: self.completed_tasks,
            failed_tasks: self.failed_tasks,
            skipped_tasks: self.skipped_tasks,
            duration_secs: self.duration.as_secs_f64(),
            error: self.error.clone(),
            tasks: self
                .executions
                .iter()
                .map(|e| TaskSummary {
                    id: e.task.id.to_string(),
                    name: e.task.name.clone(),
                    success: e.success,
                    duration_secs: e.duration().as_secs_f64(),
                    retry_count: e.retry_count,
                    from_cache: e.from_cache,
                    error: e.error.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub run_id: String,
    pub success: bool,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub skipped_tasks: usize,
    pub duration_secs: f64,
    pub error: Option<String>,
    pub tasks: Vec<TaskSummary>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub name: String,
    pub success: bool,
    pub duration_secs: f64,
    pub retry_count: u32,
    pub from_cache: bool,
    pub error: Option<String>,
}

/// Drives a task list from resolution to a [`WorkflowResult`].
pub struct ExecutionCoordinator {
    config: OrchestratorConfig,
    root: PathBuf,
    resolver: DependencyResolver,
    generator: Arc<dyn Generator>,
    verifier: Arc<dyn Verifier>,
    repairer: Option<Arc<dyn Repairer>>,
    committer: Option<Arc<dyn Committer>>,
    event_sink: Arc<dyn EventSink>,
    cache: Option<ResultCache>,
    progress: ProgressLog,
}

impl ExecutionCoordinator {
    /// Creates a coordinator with default collaborators chosen from `config`.
    ///
    /// Verification runs through [`ShellVerifier`]. `git_commit` installs a
    /// [`GitCommitter`], `trace_file` a [`JsonlEventSink`] and `use_cache` a
    /// [`ResultCache`] under `cache_dir`.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::Config` if the configuration fails validation.
    pub fn new(
        config: OrchestratorConfig,
        root: impl Into<PathBuf>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        config.validate()?;
        let root = root.into();

        let committer: Option<Arc<dyn Committer>> = if config.git_commit {
            Some(Arc::new(GitCommitter::new(root.clone())))
        } else {
            None
        };
        let event_sink: Arc<dyn EventSink> = match &config.trace_file {
            Some(path) => Arc::new(JsonlEventSink::new(root.join(path))),
            None => Arc::new(NoopEventSink),
        };
        let cache = config
            .use_cache
            .then(|| ResultCache::new(config.cache_dir.clone(), config.cache_ttl()));
        let progress = ProgressLog::new(root.join(&config.progress_file));

        Ok(Self {
            config,
            root,
            resolver: DependencyResolver::new(),
            generator,
            verifier: Arc::new(ShellVerifier::new()),
            repairer: None,
            committer,
            event_sink,
            cache,
            progress,
        })
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_repairer(mut self, repairer: Arc<dyn Repairer>) -> Self {
        self.repairer = Some(repairer);
        self
    }

    pub fn with_committer(mut self, committer: Arc<dyn Committer>) -> Self {
        self.committer = Some(committer);
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Uses `cache` regardless of `use_cache`.
    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn progress_log(&self) -> &ProgressLog {
        &self.progress
    }

    pub fn cache(&self) -> Option<&ResultCache> {
        self.cache.as_ref()
    }

    fn wave_executor(&self, events: EventEmitter) -> WaveExecutor {
        let mut attempts = AttemptCoordinator::new(
            self.root.clone(),
            AttemptSettings::from(&self.config),
            Arc::clone(&self.generator),
            Arc::clone(&self.verifier),
            events,
        );
        if let Some(repairer) = &self.repairer {
            attempts = attempts.with_repairer(Arc::clone(repairer));
        }
        if let Some(committer) = &self.committer {
            attempts = attempts.with_committer(Arc::clone(committer));
        }
        if let Some(cache) = &self.cache {
            attempts = attempts.with_cache(cache.clone());
        }

        if self.config.parallel {
            WaveExecutor::parallel(attempts, self.config.max_concurrency)
        } else {
            WaveExecutor::sequential(attempts)
        }
    }

    async fn resumed_ids(&self) -> BTreeSet<TaskId> {
        if !self.config.resume {
            return BTreeSet::new();
        }
        match self.progress.passed_task_ids().await {
            Ok(ids) => {
                tracing::info!("Resuming: {} tasks already passed", ids.len());
                ids
            }
            Err(e) => {
                tracing::warn!("Could not read progress log, resuming from scratch: {}", e);
                BTreeSet::new()
            }
        }
    }

    /// Runs a parsed plan.
    pub async fn run_phases(&self, phases: &[Phase]) -> WorkflowResult {
        self.run(&Phase::flatten(phases)).await
    }

    /// Parses `document` with `source` and runs the result.
    ///
    /// A parse failure yields a failed result with no tasks.
    pub async fn run_document(&self, source: &dyn PlanSource, document: &str) -> WorkflowResult {
        match source.parse(document) {
            Ok(phases) => self.run_phases(&phases).await,
            Err(e) => {
                let run_id = Uuid::new_v4();
                tracing::error!("Failed to parse plan: {}", e);
                let events = EventEmitter::new(Arc::clone(&self.event_sink), run_id);
                events
                    .emit(EventKind::WorkflowAborted, SOURCE, json!({ "error": e.to_string() }))
                    .await;
                WorkflowResult::aborted(run_id, 0, e.to_string(), Duration::ZERO)
            }
        }
    }

    /// Runs `tasks` to completion.
    pub async fn run(&self, tasks: &[Task]) -> WorkflowResult {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let events = EventEmitter::new(Arc::clone(&self.event_sink), run_id);
        let total = tasks.len();

        tracing::info!("Starting workflow {} with {} tasks", run_id, total);

        let waves = match self.resolver.resolve(tasks) {
            Ok(waves) => waves,
            Err(e) => {
                tracing::error!("Cannot execute plan: {}", e);
                events
                    .emit(EventKind::WorkflowAborted, SOURCE, json!({ "error": e.to_string() }))
                    .await;
                return WorkflowResult::aborted(run_id, total, e.to_string(), started.elapsed());
            }
        };

        let passed = self.resumed_ids().await;
        let executor = self.wave_executor(events.clone());

        let mut executions = Vec::with_capacity(total);
        let mut skipped = 0;
        let mut stopped = false;

        for (index, wave) in waves.iter().enumerate() {
            if stopped {
                skipped += wave.len();
                continue;
            }

            let pending: Wave = wave
                .iter()
                .filter(|task| !passed.contains(&task.id))
                .cloned()
                .collect();
            let resumed = wave.len() - pending.len();
            if resumed > 0 {
                tracing::info!("Wave {}: skipping {} passed tasks", index + 1, resumed);
                skipped += resumed;
            }
            if pending.is_empty() {
                continue;
            }

            let ids: Vec<String> = pending.ids().into_iter().map(TaskId::into_inner).collect();
            tracing::info!("Wave {}/{}: {}", index + 1, waves.len(), ids.join(", "));
            events
                .emit(
                    EventKind::WaveStarted,
                    SOURCE,
                    json!({ "wave": index + 1, "task_ids": ids }),
                )
                .await;

            let results = executor.run(&pending).await;
            let wave_failed = results.iter().any(|e| !e.success);

            for execution in results {
                if let Err(e) = self
                    .progress
                    .record(&execution.task, execution.success, execution.error.clone())
                    .await
                {
                    tracing::warn!("Failed to update progress log: {}", e);
                }
                executions.push(execution);
            }

            if wave_failed && !self.config.continue_on_failure {
                tracing::warn!("Stopping after wave {} due to failed tasks", index + 1);
                stopped = true;
            }
        }

        let completed = executions.iter().filter(|e| e.success).count();
        let failed = executions.len() - completed;
        let result = WorkflowResult {
            run_id,
            success: failed == 0,
            total_tasks: total,
            completed_tasks: completed,
            failed_tasks: failed,
            skipped_tasks: skipped,
            duration: started.elapsed(),
            executions,
            error: None,
        };

        tracing::info!(
            "Workflow {} finished: {} completed, {} failed, {} skipped in {:.1}s",
            run_id,
            completed,
            failed,
            skipped,
            result.duration.as_secs_f64()
        );
        events
            .emit(
                EventKind::WorkflowCompleted,
                SOURCE,
                json!({
                    "success": result.success,
                    "total_tasks": total,
                    "completed_tasks": completed,
                    "failed_tasks": failed,
                    "skipped_tasks": skipped,
                }),
            )
            .await;

        result
    }
}
