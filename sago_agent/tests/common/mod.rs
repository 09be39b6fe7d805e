//! Scripted collaborators shared by the integration suites.

#![allow(dead_code)]

use async_trait::async_trait;
use sago_agent::collab::{Committer, EventSink, Generator, Repairer, Verifier, VerifyOutcome};
use sago_agent::{AgentError, EventKind, ExecutionCoordinator, OrchestratorConfig};
use sago_core::{Task, TaskId};
use sago_runtime::FileMap;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Generator that writes `# <id>` into the task's primary file.
///
/// Each task fails its first `failures_before_success` calls; tasks listed
/// in `always_fail` never succeed.
#[derive(Default)]
pub struct ScriptedGenerator {
    pub failures_before_success: usize,
    pub always_fail: HashSet<String>,
    pub delay: Duration,
    calls: AtomicUsize,
    calls_by_task: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    contexts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(n: usize) -> Self {
        Self {
            failures_before_success: n,
            ..Self::default()
        }
    }

    pub fn always_failing<I: IntoIterator<Item = &'static str>>(ids: I) -> Self {
        Self {
            always_fail: ids.into_iter().map(str::to_string).collect(),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, id: &str) -> usize {
        self.calls_by_task
            .lock()
            .unwrap()
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn contexts(&self) -> Vec<String> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, task: &Task, context: &str) -> sago_agent::Result<FileMap> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().unwrap().push(context.to_string());
        let call = {
            let mut by_task = self.calls_by_task.lock().unwrap();
            let count = by_task.entry(task.id.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.always_fail.contains(task.id.as_str()) || call <= self.failures_before_success {
            return Err(AgentError::Generation(format!("scripted failure {}", call)));
        }

        let mut files = FileMap::new();
        if let Some(primary) = task.primary_file() {
            files.insert(primary.to_string(), format!("# {}\n", task.id));
        }
        Ok(files)
    }
}

/// Verifier that replays scripted outcomes, then passes.
#[derive(Default)]
pub struct CountingVerifier {
    outcomes: Mutex<Vec<VerifyOutcome>>,
    calls: AtomicUsize,
}

impl CountingVerifier {
    pub fn passing() -> Self {
        Self::default()
    }

    /// Returns these outcomes on the first calls, in order.
    pub fn with_outcomes(outcomes: Vec<VerifyOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().rev().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails with these exit codes on the first calls, in order.
    pub fn scripted(exit_codes: Vec<i32>) -> Self {
        Self::with_outcomes(
            exit_codes
                .into_iter()
                .map(|code| match code {
                    0 => VerifyOutcome::passed("ok"),
                    code => failed_with(code, "AssertionError: expected 2"),
                })
                .collect(),
        )
    }

    /// Times out on the first `n` calls.
    pub fn timing_out(n: usize) -> Self {
        Self::with_outcomes(
            (0..n)
                .map(|_| VerifyOutcome {
                    exit_code: -1,
                    timed_out: true,
                    ..VerifyOutcome::default()
                })
                .collect(),
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// A failed outcome with `stderr`.
pub fn failed_with(exit_code: i32, stderr: &str) -> VerifyOutcome {
    VerifyOutcome {
        exit_code,
        stdout: String::new(),
        stderr: stderr.to_string(),
        timed_out: false,
    }
}

#[async_trait]
impl Verifier for CountingVerifier {
    async fn verify(&self, _command: &str, _cwd: &Path, _timeout: Duration) -> VerifyOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcomes
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| VerifyOutcome::passed("ok"))
    }
}

/// Repairer with a fixed verdict and a fixed patch (`None` means no repair).
pub struct ScriptedRepairer {
    pub accept: bool,
    pub patch: Option<FileMap>,
    errors: Mutex<Vec<String>>,
    originals: Mutex<Vec<FileMap>>,
}

impl ScriptedRepairer {
    pub fn new(accept: bool, patch: Option<FileMap>) -> Self {
        Self {
            accept,
            patch,
            errors: Mutex::new(Vec::new()),
            originals: Mutex::new(Vec::new()),
        }
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn originals(&self) -> Vec<FileMap> {
        self.originals.lock().unwrap().clone()
    }
}

#[async_trait]
impl Repairer for ScriptedRepairer {
    async fn should_repair(&self, error: &str, _task: &Task) -> bool {
        self.errors.lock().unwrap().push(error.to_string());
        self.accept
    }

    async fn repair(
        &self,
        _task: &Task,
        _error: &str,
        original_files: &FileMap,
        _diagnostics: &str,
    ) -> Option<FileMap> {
        self.originals.lock().unwrap().push(original_files.clone());
        self.patch.clone()
    }
}

/// Committer that records what it was asked to commit.
pub struct RecordingCommitter {
    succeed: bool,
    commits: Mutex<Vec<(TaskId, String, Vec<String>)>>,
}

impl Default for RecordingCommitter {
    fn default() -> Self {
        Self {
            succeed: true,
            commits: Mutex::new(Vec::new()),
        }
    }
}

impl RecordingCommitter {
    /// Records every request but reports each commit as failed.
    pub fn rejecting() -> Self {
        Self {
            succeed: false,
            ..Self::default()
        }
    }

    pub fn commits(&self) -> Vec<(TaskId, String, Vec<String>)> {
        self.commits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Committer for RecordingCommitter {
    async fn commit(&self, task_id: &TaskId, task_name: &str, changed_files: &[String]) -> bool {
        self.commits.lock().unwrap().push((
            task_id.clone(),
            task_name.to_string(),
            changed_files.to_vec(),
        ));
        self.succeed
    }
}

/// Event sink that keeps every event in memory.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(EventKind, String, serde_json::Value)>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<(EventKind, String, serde_json::Value)> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _, _)| *k == kind)
            .count()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn record_event(&self, kind: EventKind, source: &str, payload: serde_json::Value) {
        self.events
            .lock()
            .unwrap()
            .push((kind, source.to_string(), payload));
    }
}

/// Config with fast timeouts and no cache.
pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        verify_timeout_secs: 5,
        task_timeout_secs: 5,
        ..OrchestratorConfig::default()
    }
}

/// Coordinator rooted at `root` with a counting verifier.
pub fn coordinator(
    root: &Path,
    config: OrchestratorConfig,
    generator: Arc<ScriptedGenerator>,
    verifier: Arc<CountingVerifier>,
) -> ExecutionCoordinator {
    ExecutionCoordinator::new(config, root, generator)
        .unwrap()
        .with_verifier(verifier)
}

/// `{1.1 a.py}`, `{1.2 b.py <- a.py}`, `{2.1 c.py <- b.py}`, `{2.2 d.py}`
pub fn reference_tasks() -> Vec<Task> {
    vec![
        Task::new("1.1", "Create a").with_files(["a.py"]).with_verify("true"),
        Task::new("1.2", "Create b")
            .with_files(["b.py", "a.py"])
            .with_verify("true"),
        Task::new("2.1", "Create c")
            .with_files(["c.py", "b.py"])
            .with_verify("true"),
        Task::new("2.2", "Create d").with_files(["d.py"]).with_verify("true"),
    ]
}

pub fn ids(executions: &[sago_agent::TaskExecution]) -> Vec<String> {
    executions.iter().map(|e| e.task.id.to_string()).collect()
}
