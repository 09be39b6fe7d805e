//! SagoKit agent layer - Attempt pipeline and wave orchestration.
//!
//! This crate drives resolved waves through pluggable collaborators:
//!
//! - Attempt: generate, verify, repair, retry ([`AttemptCoordinator`])
//! - Wave: sequential or bounded-parallel execution ([`WaveExecutor`])
//! - Run: wave ordering, stop-on-failure, progress log ([`ExecutionCoordinator`])
//!
//! Collaborators are trait objects (see [`collab`]); shell verification, git
//! commits and a JSONL event trace ship as default implementations.
//!
//! # Example
//!
//! ```no_run
//! use sago_agent::{ExecutionCoordinator, OrchestratorConfig};
//! use sago_agent::collab::Generator;
//! use sago_core::Task;
//! use std::sync::Arc;
//!
//! # async fn run(generator: Arc<dyn Generator>) -> sago_agent::Result<()> {
//! let config = OrchestratorConfig::default();
//! config.init_tracing();
//! let coordinator = ExecutionCoordinator::new(config, ".", generator)?;
//!
//! let tasks = vec![Task::new("1.1", "Create a").with_files(["a.py"])];
//! let result = coordinator.run(&tasks).await;
//! println!("{} of {} tasks completed", result.completed_tasks, result.total_tasks);
//! # Ok(())
//! # }
//! ```

pub mod attempt;
pub mod collab;
pub mod commit;
pub mod config;
pub mod events;
pub mod logging;
pub mod orchestrator;
pub mod verify;
pub mod wave;

/// Error types for agent operations.
#[derive(thiserror::Error, Debug)]
pub enum AgentError {
    /// Generation collaborator failed
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Plan could not be resolved
    #[error("Plan error: {0}")]
    Plan(#[from] sago_core::PlanError),

    /// Cache, snapshot or progress-log failure
    #[error("Runtime error: {0}")]
    Runtime(#[from] sago_runtime::RuntimeError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration document could not be parsed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

pub use attempt::{AttemptCoordinator, GenerationResult, TaskExecution, VerificationResult};
pub use config::OrchestratorConfig;
pub use events::{EventKind, JsonlEventSink, NoopEventSink};
pub use orchestrator::{ExecutionCoordinator, TaskSummary, WorkflowResult, WorkflowSummary};
pub use wave::WaveExecutor;
