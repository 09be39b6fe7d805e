//! Error types for plan resolution.

use crate::task::TaskId;

/// Plan-level error.
///
/// These describe structural problems in the task list itself. They are
/// raised before any task runs and are never retried.
#[derive(thiserror::Error, Debug)]
pub enum PlanError {
    /// The dependency graph contains at least one cycle.
    #[error("Circular dependencies detected in task graph involving: {0:?}")]
    CycleDetected(Vec<TaskId>),

    /// Two tasks share the same id.
    #[error("Duplicate task id: {0}")]
    DuplicateTaskId(TaskId),

    /// An explicit dependency names a task that is not in the plan.
    #[error("Task {task} depends on unknown task {dependency}")]
    UnknownDependency {
        /// Task declaring the dependency
        task: TaskId,
        /// The id that could not be found
        dependency: TaskId,
    },

    /// The plan document is well-formed but unusable.
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlanError {
    /// Returns true for plan-level defects in the task graph itself.
    pub fn is_cycle(&self) -> bool {
        matches!(self, PlanError::CycleDetected(_))
    }
}

/// Type alias for Result with PlanError.
pub type Result<T> = std::result::Result<T, PlanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlanError::DuplicateTaskId(TaskId::new("1.1"));
        assert_eq!(err.to_string(), "Duplicate task id: 1.1");
    }

    #[test]
    fn test_unknown_dependency_display() {
        let err = PlanError::UnknownDependency {
            task: TaskId::new("2.1"),
            dependency: TaskId::new("9.9"),
        };
        assert_eq!(err.to_string(), "Task 2.1 depends on unknown task 9.9");
        assert!(!err.is_cycle());
    }

    #[test]
    fn test_cycle_is_plan_defect() {
        let err = PlanError::CycleDetected(vec![TaskId::new("a"), TaskId::new("b")]);
        assert!(err.is_cycle());
        assert!(err.to_string().contains("Circular dependencies"));
    }
}
