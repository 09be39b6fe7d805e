//! Randomized properties of dependency resolution.
//!
//! Task sets are generated from a seeded RNG over a small file pool so that
//! primary-file collisions and cross-references are frequent.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use sago_core::{cycle, DependencyGraph, DependencyResolver, PlanError, PlanSource, Task, TaskId};
use std::collections::{HashMap, HashSet};

const FILES: &[&str] = &["a.py", "b.py", "c.py", "d.py", "e.py", "shared.py"];

fn random_tasks(rng: &mut StdRng) -> Vec<Task> {
    let count = rng.gen_range(1..=12);
    (0..count)
        .map(|i| {
            let file_count = rng.gen_range(0..=3);
            let files: Vec<&str> = (0..file_count)
                .map(|_| *FILES.choose(rng).unwrap())
                .collect();
            Task::new(format!("{}.{}", i / 4 + 1, i % 4 + 1), format!("task {}", i)).with_files(files)
        })
        .collect()
}

#[test]
fn test_waves_are_a_permutation_of_input() {
    let mut rng = StdRng::seed_from_u64(7);
    let resolver = DependencyResolver::new();

    for _ in 0..500 {
        let tasks = random_tasks(&mut rng);
        match resolver.resolve(&tasks) {
            Ok(waves) => {
                assert!(!waves.is_empty());
                let mut seen: Vec<TaskId> = waves.iter().flat_map(|w| w.ids()).collect();
                let mut expected: Vec<TaskId> = tasks.iter().map(|t| t.id.clone()).collect();
                seen.sort();
                expected.sort();
                assert_eq!(seen, expected);
            }
            Err(PlanError::CycleDetected(members)) => {
                assert!(!members.is_empty());
                let graph = DependencyGraph::build(&tasks).unwrap();
                assert!(cycle::has_cycle(&graph));
            }
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
}

#[test]
fn test_no_shared_primary_file_within_a_wave() {
    let mut rng = StdRng::seed_from_u64(42);
    let resolver = DependencyResolver::new();

    for _ in 0..500 {
        let tasks = random_tasks(&mut rng);
        let Ok(waves) = resolver.resolve(&tasks) else {
            continue;
        };

        for wave in &waves {
            let mut claimed = HashSet::new();
            for task in wave.iter() {
                if let Some(primary) = task.primary_file() {
                    assert!(
                        claimed.insert(primary.to_string()),
                        "{} shared within wave {:?}",
                        primary,
                        wave.ids()
                    );
                }
            }
        }
    }
}

#[test]
fn test_dependencies_land_in_earlier_waves() {
    let mut rng = StdRng::seed_from_u64(1234);
    let resolver = DependencyResolver::new();

    for _ in 0..300 {
        let tasks = random_tasks(&mut rng);
        let Ok(waves) = resolver.resolve(&tasks) else {
            continue;
        };
        let graph = DependencyGraph::build(&tasks).unwrap();

        let position: HashMap<TaskId, usize> = waves
            .iter()
            .enumerate()
            .flat_map(|(i, w)| w.ids().into_iter().map(move |id| (id, i)))
            .collect();

        for (id, deps) in graph.iter() {
            for dep in deps {
                assert!(position[dep] < position[id], "{} must run after {}", id, dep);
            }
        }
    }
}

#[test]
fn test_referencing_a_primary_file_creates_an_edge() {
    let mut rng = StdRng::seed_from_u64(99);

    for _ in 0..300 {
        let tasks = random_tasks(&mut rng);
        let graph = DependencyGraph::build(&tasks).unwrap();
        let creators = sago_core::graph::file_creators(&tasks);

        for task in &tasks {
            for file in &task.files {
                if let Some(creator) = creators.get(file) {
                    if creator != &task.id {
                        assert!(graph.depends_on(&task.id, creator));
                    }
                }
            }
        }
    }
}

#[test]
fn test_cycle_scenario_returns_no_waves() {
    let tasks = vec![
        Task::new("1.1", "needs c").with_files(["a.py", "c.py"]),
        Task::new("2.1", "needs a").with_files(["b.py", "a.py"]),
        Task::new("3.1", "needs b").with_files(["c.py", "b.py"]),
    ];

    let result = DependencyResolver::new().resolve(&tasks);
    assert!(matches!(result, Err(PlanError::CycleDetected(_))));
}

#[test]
fn test_yaml_plan_resolves_in_phase_order() -> anyhow::Result<()> {
    let plan = r#"
phases:
  - name: Foundation
    tasks:
      - id: "1.1"
        name: Create a
        files: [a.py]
      - id: "1.2"
        name: Create b
        files: [b.py, a.py]
  - name: Features
    tasks:
      - id: "2.1"
        name: Create c
        files: [c.py, b.py]
      - id: "2.2"
        name: Create d
        files: [d.py]
"#;
    let phases = sago_core::YamlPlanSource::new().parse(plan)?;
    let tasks = sago_core::Phase::flatten(&phases);
    let waves = DependencyResolver::new().resolve(&tasks)?;

    let layout: Vec<Vec<String>> = waves
        .iter()
        .map(|w| w.ids().into_iter().map(TaskId::into_inner).collect())
        .collect();
    assert_eq!(layout, vec![vec!["1.1", "2.2"], vec!["1.2"], vec!["2.1"]]);
    assert_eq!(tasks[2].phase_name, "Features");
    Ok(())
}
