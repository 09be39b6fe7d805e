//! Wave scheduling.
//!
//! Layers an acyclic [`DependencyGraph`] into ordered waves with Kahn's
//! algorithm. Every task in a wave has all of its dependencies in earlier
//! waves, so the tasks of one wave may run together.

use crate::graph::DependencyGraph;
use crate::task::{Task, TaskId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// An ordered group of mutually independent tasks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Wave {
    tasks: Vec<Arc<Task>>,
}

impl Wave {
    /// Creates a wave from tasks in execution order.
    pub fn new(tasks: Vec<Arc<Task>>) -> Self {
        Self { tasks }
    }

    pub fn tasks(&self) -> &[Arc<Task>] {
        &self.tasks
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Task>> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Returns the ids of the wave's tasks in order.
    pub fn ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|t| t.id.clone()).collect()
    }

    pub fn into_tasks(self) -> Vec<Arc<Task>> {
        self.tasks
    }
}

impl FromIterator<Arc<Task>> for Wave {
    fn from_iter<I: IntoIterator<Item = Arc<Task>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Builds execution waves from a dependency graph.
pub struct WaveScheduler;

impl WaveScheduler {
    /// Layers the graph into waves.
    ///
    /// Within a wave, tasks appear in ascending id order. Graph nodes with no
    /// matching task are skipped. If no task is ready while some remain
    /// unscheduled (only possible with a cycle, which callers check first)
    /// the remaining tasks are logged and dropped.
    pub fn schedule(graph: &DependencyGraph, tasks: &[Task]) -> Vec<Wave> {
        let by_id: HashMap<&TaskId, Arc<Task>> = tasks
            .iter()
            .map(|t| (&t.id, Arc::new(t.clone())))
            .collect();

        let mut in_degree: BTreeMap<&TaskId, usize> = BTreeMap::new();
        let mut dependents: HashMap<&TaskId, Vec<&TaskId>> = HashMap::new();
        for (id, deps) in graph.iter() {
            in_degree.insert(id, deps.len());
            for dep in deps {
                dependents.entry(dep).or_default().push(id);
            }
        }

        let mut waves = Vec::new();
        let mut scheduled = 0usize;
        let total = in_degree.len();

        while scheduled < total {
            let ready: Vec<&TaskId> = in_degree
                .iter()
                .filter(|(_, degree)| **degree == 0)
                .map(|(id, _)| *id)
                .collect();

            if ready.is_empty() {
                let remaining: Vec<&TaskId> = in_degree.keys().copied().collect();
                tracing::error!("No tasks ready to execute. Remaining: {:?}", remaining);
                break;
            }

            for id in &ready {
                in_degree.remove(id);
                for dependent in dependents.get(id).into_iter().flatten() {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree = degree.saturating_sub(1);
                    }
                }
            }
            scheduled += ready.len();

            let wave: Wave = ready
                .iter()
                .filter_map(|id| by_id.get(id).cloned())
                .collect();
            if !wave.is_empty() {
                waves.push(wave);
            }
        }

        waves
    }
}
