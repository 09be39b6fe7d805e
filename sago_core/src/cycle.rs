//! Cycle detection over a [`DependencyGraph`].
//!
//! Depth-first search with an explicit recursion stack. The search stops at
//! the first back-edge to a node that is still on the stack.

use crate::graph::DependencyGraph;
use crate::task::TaskId;
use std::collections::HashSet;

/// Returns true if the graph contains a cycle.
pub fn has_cycle(graph: &DependencyGraph) -> bool {
    find_cycle(graph).is_some()
}

/// Returns the first cycle found, as a path that starts and ends on the
/// same task (`a -> b -> a`), or `None` if the graph is acyclic.
pub fn find_cycle(graph: &DependencyGraph) -> Option<Vec<TaskId>> {
    let mut visited: HashSet<&TaskId> = HashSet::new();

    for root in graph.task_ids() {
        if visited.contains(root) {
            continue;
        }

        // Each frame holds a node and the dependencies still to explore.
        let mut stack: Vec<(&TaskId, Vec<&TaskId>)> = Vec::new();
        let mut on_stack: HashSet<&TaskId> = HashSet::new();

        visited.insert(root);
        on_stack.insert(root);
        stack.push((root, pending_deps(graph, root)));

        while let Some((node, pending)) = stack.last_mut() {
            let node = *node;
            match pending.pop() {
                Some(dep) if on_stack.contains(dep) => {
                    tracing::error!("Circular dependency detected: {} -> {}", node, dep);
                    let start = stack.iter().position(|(id, _)| *id == dep).unwrap_or(0);
                    let mut path: Vec<TaskId> =
                        stack[start..].iter().map(|(id, _)| (*id).clone()).collect();
                    path.push(dep.clone());
                    return Some(path);
                }
                Some(dep) if !visited.contains(dep) => {
                    visited.insert(dep);
                    on_stack.insert(dep);
                    stack.push((dep, pending_deps(graph, dep)));
                }
                Some(_) => {}
                None => {
                    on_stack.remove(node);
                    stack.pop();
                }
            }
        }
    }

    None
}

/// Dependencies in reverse order so `pop` explores them ascending.
fn pending_deps<'a>(graph: &'a DependencyGraph, id: &TaskId) -> Vec<&'a TaskId> {
    graph
        .dependencies(id)
        .map(|deps| deps.iter().rev().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> DependencyGraph {
        DependencyGraph::from_edges(edges.iter().map(|(id, deps)| {
            (
                TaskId::new(*id),
                deps.iter().map(|d| TaskId::new(*d)).collect::<Vec<_>>(),
            )
        }))
    }

    #[test]
    fn test_acyclic_graph() {
        let g = graph(&[("a", &[]), ("b", &["a"]), ("c", &["a", "b"])]);
        assert!(!has_cycle(&g));
        assert!(find_cycle(&g).is_none());
    }

    #[test]
    fn test_three_node_cycle() {
        let g = graph(&[("1.1", &["3.1"]), ("2.1", &["1.1"]), ("3.1", &["2.1"])]);
        assert!(has_cycle(&g));

        let path = find_cycle(&g).unwrap();
        assert_eq!(path.first(), path.last());
        assert_eq!(path.len(), 4);
    }

    #[test]
    fn test_two_node_cycle() {
        let g = graph(&[("a", &["b"]), ("b", &["a"])]);
        assert!(has_cycle(&g));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        // Shared dependency reached twice must not look like a back-edge.
        let g = graph(&[("a", &[]), ("b", &["a"]), ("c", &["a"]), ("d", &["b", "c"])]);
        assert!(!has_cycle(&g));
    }

    #[test]
    fn test_cycle_in_disconnected_component() {
        let g = graph(&[("a", &[]), ("b", &["a"]), ("x", &["y"]), ("y", &["x"])]);
        let path = find_cycle(&g).unwrap();
        assert!(path.contains(&TaskId::new("x")));
        assert!(path.contains(&TaskId::new("y")));
    }

    #[test]
    fn test_empty_graph() {
        assert!(!has_cycle(&DependencyGraph::default()));
    }
}
