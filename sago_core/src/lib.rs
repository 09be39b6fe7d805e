//! SagoKit core - Task model and dependency resolution.
//!
//! This crate turns a flat list of planned tasks into an ordered sequence of
//! waves that are safe to execute:
//!
//! - **Model**: [`Task`], [`Phase`], [`TaskId`]
//! - **Graph**: dependencies inferred from declared file lists
//! - **Cycles**: plan-level defects detected before anything runs
//! - **Waves**: Kahn layering plus write-conflict splitting
//! - **Plans**: [`PlanSource`] with YAML and `PLAN.md` implementations
//!
//! # Example
//!
//! ```rust
//! use sago_core::{DependencyResolver, Task};
//!
//! let tasks = vec![
//!     Task::new("1.1", "Create a").with_files(["a.py"]),
//!     Task::new("1.2", "Create b").with_files(["b.py", "a.py"]),
//! ];
//!
//! let waves = DependencyResolver::new().resolve(&tasks).unwrap();
//! assert_eq!(waves.len(), 2);
//! ```

pub mod cycle;
pub mod error;
pub mod graph;
pub mod plan;
pub mod resolver;
pub mod split;
pub mod task;
pub mod wave;

pub use error::{PlanError, Result};
pub use graph::DependencyGraph;
pub use plan::{MarkdownPlanSource, PlanSource, YamlPlanSource};
pub use resolver::DependencyResolver;
pub use split::WaveConflictSplitter;
pub use task::{Phase, Task, TaskId};
pub use wave::{Wave, WaveScheduler};
