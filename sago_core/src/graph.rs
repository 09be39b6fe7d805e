//! Dependency graph inferred from declared file lists.
//!
//! A task depends on another task when it references a file that the other
//! task creates. The creator of a file is the lowest task id (string order)
//! that lists the file first. Explicit `depends_on` ids are merged in.

use crate::error::{PlanError, Result};
use crate::task::{Task, TaskId};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Task id to the set of task ids it depends on.
///
/// Backed by ordered collections so iteration order is stable for a fixed
/// task list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: BTreeMap<TaskId, BTreeSet<TaskId>>,
}

impl DependencyGraph {
    /// Builds the graph for a task list.
    ///
    /// # Returns
    ///
    /// - `Err(PlanError::DuplicateTaskId)` if two tasks share an id
    /// - `Err(PlanError::UnknownDependency)` if an explicit dependency is missing
    pub fn build(tasks: &[Task]) -> Result<Self> {
        let mut sorted: Vec<&Task> = tasks.iter().collect();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));

        for pair in sorted.windows(2) {
            if pair[0].id == pair[1].id {
                return Err(PlanError::DuplicateTaskId(pair[0].id.clone()));
            }
        }

        let creators = file_creators(tasks);
        let mut edges: BTreeMap<TaskId, BTreeSet<TaskId>> = BTreeMap::new();

        for task in &sorted {
            let deps = edges.entry(task.id.clone()).or_default();

            for file in &task.files {
                if let Some(creator) = creators.get(file) {
                    if creator != &task.id {
                        deps.insert(creator.clone());
                    }
                }
            }

            for dep in &task.depends_on {
                if dep == &task.id {
                    continue;
                }
                if sorted.binary_search_by(|t| t.id.cmp(dep)).is_err() {
                    return Err(PlanError::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    });
                }
                deps.insert(dep.clone());
            }
        }

        Ok(Self { edges })
    }

    /// Builds a graph directly from an adjacency map.
    ///
    /// Ids referenced only as dependencies are added as nodes without
    /// dependencies of their own.
    pub fn from_edges<I, D>(edges: I) -> Self
    where
        I: IntoIterator<Item = (TaskId, D)>,
        D: IntoIterator<Item = TaskId>,
    {
        let mut map: BTreeMap<TaskId, BTreeSet<TaskId>> = BTreeMap::new();
        for (id, deps) in edges {
            let deps: BTreeSet<TaskId> = deps.into_iter().collect();
            for dep in &deps {
                map.entry(dep.clone()).or_default();
            }
            map.entry(id).or_default().extend(deps);
        }
        Self { edges: map }
    }

    /// Returns the ids a task depends on.
    pub fn dependencies(&self, id: &TaskId) -> Option<&BTreeSet<TaskId>> {
        self.edges.get(id)
    }

    /// Returns true if `task` directly depends on `dependency`.
    pub fn depends_on(&self, task: &TaskId, dependency: &TaskId) -> bool {
        self.edges
            .get(task)
            .is_some_and(|deps| deps.contains(dependency))
    }

    /// Iterates over task ids in ascending order.
    pub fn task_ids(&self) -> impl Iterator<Item = &TaskId> {
        self.edges.keys()
    }

    /// Iterates over `(task, dependencies)` pairs in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (&TaskId, &BTreeSet<TaskId>)> {
        self.edges.iter()
    }

    /// Returns the number of tasks in the graph.
    pub fn task_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns the total number of dependency edges.
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Returns every task that participates in a cycle.
    ///
    /// Uses strongly connected components; only components with more than
    /// one node are cycles since self references are never recorded.
    pub fn cycle_members(&self) -> Vec<TaskId> {
        let mut graph: DiGraph<TaskId, ()> = DiGraph::new();
        let mut index: HashMap<&TaskId, NodeIndex> = HashMap::new();

        for id in self.edges.keys() {
            index.insert(id, graph.add_node(id.clone()));
        }
        for (id, deps) in &self.edges {
            for dep in deps {
                if let (Some(&from), Some(&to)) = (index.get(dep), index.get(id)) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        let mut members: Vec<TaskId> = petgraph::algo::tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .flat_map(|scc| {
                scc.into_iter()
                    .filter_map(|idx| graph.node_weight(idx).cloned())
                    .collect::<Vec<_>>()
            })
            .collect();
        members.sort();
        members
    }
}

/// Maps each primary file to the task that creates it.
///
/// Tasks are visited in ascending id order and the first claim wins.
pub fn file_creators(tasks: &[Task]) -> BTreeMap<String, TaskId> {
    let mut sorted: Vec<&Task> = tasks.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut creators = BTreeMap::new();
    for task in sorted {
        if let Some(primary) = task.primary_file() {
            creators
                .entry(primary.to_string())
                .or_insert_with(|| task.id.clone());
        }
    }
    creators
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, files: &[&str]) -> Task {
        Task::new(id, format!("Task {}", id)).with_files(files.iter().copied())
    }

    #[test]
    fn test_reading_created_file_adds_edge() {
        let tasks = vec![task("1.1", &["a.py"]), task("1.2", &["b.py", "a.py"])];
        let graph = DependencyGraph::build(&tasks).unwrap();

        assert!(graph.depends_on(&TaskId::new("1.2"), &TaskId::new("1.1")));
        assert!(graph.dependencies(&TaskId::new("1.1")).unwrap().is_empty());
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_self_reference_is_not_an_edge() {
        let tasks = vec![task("1.1", &["a.py", "a.py"])];
        let graph = DependencyGraph::build(&tasks).unwrap();

        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_lowest_id_wins_creator_slot() {
        let tasks = vec![task("1.2", &["shared.py"]), task("1.1", &["shared.py"])];
        let creators = file_creators(&tasks);
        assert_eq!(creators.get("shared.py"), Some(&TaskId::new("1.1")));

        let graph = DependencyGraph::build(&tasks).unwrap();
        assert!(graph.depends_on(&TaskId::new("1.2"), &TaskId::new("1.1")));
        assert!(!graph.depends_on(&TaskId::new("1.1"), &TaskId::new("1.2")));
    }

    #[test]
    fn test_non_primary_files_do_not_create() {
        let tasks = vec![task("1.1", &["a.py", "b.py"]), task("1.2", &["c.py", "b.py"])];
        let graph = DependencyGraph::build(&tasks).unwrap();

        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_explicit_dependencies_merge() {
        let tasks = vec![
            task("1.1", &["a.py"]),
            task("1.2", &["b.py"]).with_dependencies(["1.1", "1.2"]),
        ];
        let graph = DependencyGraph::build(&tasks).unwrap();

        assert!(graph.depends_on(&TaskId::new("1.2"), &TaskId::new("1.1")));
        assert!(!graph.depends_on(&TaskId::new("1.2"), &TaskId::new("1.2")));
    }

    #[test]
    fn test_unknown_explicit_dependency() {
        let tasks = vec![task("1.1", &["a.py"]).with_dependencies(["9.9"])];
        let result = DependencyGraph::build(&tasks);

        assert!(matches!(result, Err(PlanError::UnknownDependency { .. })));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let tasks = vec![task("1.1", &["a.py"]), task("1.1", &["b.py"])];
        let result = DependencyGraph::build(&tasks);

        assert!(matches!(result, Err(PlanError::DuplicateTaskId(id)) if id.as_str() == "1.1"));
    }

    #[test]
    fn test_build_is_deterministic() {
        let tasks = vec![
            task("2.1", &["c.py", "b.py"]),
            task("1.1", &["a.py"]),
            task("1.2", &["b.py", "a.py"]),
        ];
        let mut reversed = tasks.clone();
        reversed.reverse();

        assert_eq!(
            DependencyGraph::build(&tasks).unwrap(),
            DependencyGraph::build(&reversed).unwrap()
        );
    }

    #[test]
    fn test_cycle_members() {
        let graph = DependencyGraph::from_edges(vec![
            (TaskId::new("a"), vec![TaskId::new("c")]),
            (TaskId::new("b"), vec![TaskId::new("a")]),
            (TaskId::new("c"), vec![TaskId::new("b")]),
            (TaskId::new("d"), vec![TaskId::new("a")]),
        ]);

        assert_eq!(
            graph.cycle_members(),
            vec![TaskId::new("a"), TaskId::new("b"), TaskId::new("c")]
        );
    }

    #[test]
    fn test_from_edges_adds_dependency_nodes() {
        let graph = DependencyGraph::from_edges(vec![(TaskId::new("b"), vec![TaskId::new("a")])]);
        assert_eq!(graph.task_count(), 2);
    }
}
