//! Dependency resolution facade.
//!
//! Runs the full pipeline: build graph, reject cycles, schedule waves, split
//! write conflicts.

use crate::cycle;
use crate::error::{PlanError, Result};
use crate::graph::DependencyGraph;
use crate::split::WaveConflictSplitter;
use crate::task::Task;
use crate::wave::{Wave, WaveScheduler};
use std::collections::HashMap;
use std::fmt::Write;

/// Resolves a task list into ordered, conflict-free waves.
#[derive(Clone, Debug, Default)]
pub struct DependencyResolver;

impl DependencyResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolves tasks into waves.
    ///
    /// # Returns
    ///
    /// - `Ok(vec![])` for an empty task list
    /// - `Err(PlanError::CycleDetected)` if the inferred graph has a cycle;
    ///   no waves are produced in that case
    pub fn resolve(&self, tasks: &[Task]) -> Result<Vec<Wave>> {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        let graph = DependencyGraph::build(tasks)?;

        if cycle::has_cycle(&graph) {
            return Err(PlanError::CycleDetected(graph.cycle_members()));
        }

        let waves = WaveScheduler::schedule(&graph, tasks);
        let waves = WaveConflictSplitter::split(waves);

        tracing::info!("Resolved {} tasks into {} waves", tasks.len(), waves.len());
        for (i, wave) in waves.iter().enumerate() {
            tracing::debug!("Wave {}: {:?}", i + 1, wave.ids());
        }

        Ok(waves)
    }

    /// Returns tasks flattened in execution order.
    pub fn task_order(&self, tasks: &[Task]) -> Result<Vec<Task>> {
        let waves = self.resolve(tasks)?;
        Ok(waves
            .iter()
            .flat_map(|wave| wave.iter().map(|t| t.as_ref().clone()))
            .collect())
    }

    /// Renders the dependency graph as text, one task per entry.
    pub fn visualize(&self, tasks: &[Task]) -> Result<String> {
        let graph = DependencyGraph::build(tasks)?;
        let names: HashMap<_, _> = tasks.iter().map(|t| (&t.id, t.name.as_str())).collect();

        let mut out = String::from("Task Dependency Graph:\n");
        for (id, deps) in graph.iter() {
            let name = names.get(id).copied().unwrap_or_default();
            let _ = write!(out, "\n  {} ({})", id, name);
            if deps.is_empty() {
                out.push_str("\n    -> no dependencies");
            } else {
                let list: Vec<&str> = deps.iter().map(|d| d.as_str()).collect();
                let _ = write!(out, "\n    -> depends on: {}", list.join(", "));
            }
        }
        Ok(out)
    }
}
