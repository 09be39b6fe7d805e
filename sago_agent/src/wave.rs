//! Wave execution.
//!
//! Runs every task of one wave, either one after another or concurrently
//! behind a semaphore. Both modes return exactly one [`TaskExecution`] per
//! task, in wave order. A panicking task becomes a failed execution; it
//! never takes down its siblings.

use crate::attempt::{AttemptCoordinator, TaskExecution};
use sago_core::{Task, Wave};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Executes waves through an [`AttemptCoordinator`].
#[derive(Clone)]
pub struct WaveExecutor {
    attempts: AttemptCoordinator,
    parallel: bool,
    max_concurrency: usize,
}

impl WaveExecutor {
    /// Runs tasks one at a time.
    pub fn sequential(attempts: AttemptCoordinator) -> Self {
        Self {
            attempts,
            parallel: false,
            max_concurrency: 1,
        }
    }

    /// Runs up to `max_concurrency` tasks at once (at least one).
    pub fn parallel(attempts: AttemptCoordinator, max_concurrency: usize) -> Self {
        Self {
            attempts,
            parallel: true,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Runs all tasks in `wave`.
    pub async fn run(&self, wave: &Wave) -> Vec<TaskExecution> {
        if self.parallel && wave.len() > 1 {
            tracing::info!(
                "Running {} tasks with concurrency {}",
                wave.len(),
                self.max_concurrency
            );
            self.run_parallel(wave).await
        } else {
            self.run_sequential(wave).await
        }
    }

    async fn run_sequential(&self, wave: &Wave) -> Vec<TaskExecution> {
        let mut executions = Vec::with_capacity(wave.len());
        for task in wave.iter() {
            let attempts = self.attempts.clone();
            let owned = Arc::clone(task);
            let execution = match tokio::spawn(async move { attempts.run(owned).await }).await {
                Ok(execution) => execution,
                Err(e) => crashed(task, e),
            };
            executions.push(execution);
        }
        executions
    }

    async fn run_parallel(&self, wave: &Wave) -> Vec<TaskExecution> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut join_set = JoinSet::new();

        for (index, task) in wave.iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let attempts = self.attempts.clone();
            let task = Arc::clone(task);

            join_set.spawn(async move {
                // The semaphore is never closed, so acquire only fails after drop.
                let _permit = semaphore.acquire_owned().await.ok();
                let owned = Arc::clone(&task);
                let execution = match tokio::spawn(async move { attempts.run(owned).await }).await {
                    Ok(execution) => execution,
                    Err(e) => crashed(&task, e),
                };
                (index, execution)
            });
        }

        let mut slots: Vec<Option<TaskExecution>> = vec![None; wave.len()];
        while let Some(joined) = join_set.join_next().await {
            if let Ok((index, execution)) = joined {
                slots[index] = Some(execution);
            }
        }

        wave.iter()
            .zip(slots)
            .map(|(task, slot)| {
                slot.unwrap_or_else(|| TaskExecution::failed(Arc::clone(task), "task did not report"))
            })
            .collect()
    }
}

fn crashed(task: &Arc<Task>, error: tokio::task::JoinError) -> TaskExecution {
    tracing::error!("Task {} crashed: {}", task.id, error);
    TaskExecution::failed(Arc::clone(task), format!("task crashed: {}", error))
}
