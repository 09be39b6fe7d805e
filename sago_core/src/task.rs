//! Task and phase model.
//!
//! Tasks are produced by a plan source and are read-only from the
//! scheduler's point of view. The first entry of a task's file list is its
//! primary output: the file the task is responsible for creating.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a task.
///
/// Conventionally `"<phase>.<sequence>"` (for example `"1.2"`), but the
/// format is not enforced. Ordering is plain string ordering, which is what
/// breaks file-creator ties.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a new TaskId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the TaskId and returns the underlying string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An atomic unit of planned work.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier
    pub id: TaskId,
    /// Human-readable name
    pub name: String,
    /// Files the task touches; index 0 is the primary output
    #[serde(default)]
    pub files: Vec<String>,
    /// Free-text description of the work
    #[serde(default)]
    pub action: String,
    /// Shell command that verifies the work
    #[serde(default)]
    pub verify: String,
    /// Free-text completion criterion
    #[serde(default)]
    pub done: String,
    /// Name of the owning phase
    #[serde(default)]
    pub phase_name: String,
    /// Explicitly declared dependencies
    #[serde(default)]
    pub depends_on: Vec<TaskId>,
}

impl Task {
    /// Creates a task with only an id and name set.
    pub fn new(id: impl Into<TaskId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            files: Vec::new(),
            action: String::new(),
            verify: String::new(),
            done: String::new(),
            phase_name: String::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    pub fn with_verify(mut self, verify: impl Into<String>) -> Self {
        self.verify = verify.into();
        self
    }

    pub fn with_done(mut self, done: impl Into<String>) -> Self {
        self.done = done.into();
        self
    }

    pub fn with_phase(mut self, phase_name: impl Into<String>) -> Self {
        self.phase_name = phase_name.into();
        self
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the file this task is responsible for creating.
    pub fn primary_file(&self) -> Option<&str> {
        self.files.first().map(String::as_str)
    }
}

/// A named group of tasks.
///
/// Phases are a display construct; scheduling works on the flattened list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    /// Phase name
    pub name: String,
    /// Phase description
    #[serde(default)]
    pub description: String,
    /// Tasks in declaration order
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Phase {
    /// Flattens phases into a single task list, phase order then task order.
    pub fn flatten(phases: &[Phase]) -> Vec<Task> {
        phases
            .iter()
            .flat_map(|phase| phase.tasks.iter().cloned())
            .collect()
    }

    /// Returns the number of tasks in this phase.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_ordering() {
        let mut ids = vec![TaskId::new("2.1"), TaskId::new("1.2"), TaskId::new("1.1")];
        ids.sort();
        assert_eq!(ids, vec![TaskId::new("1.1"), TaskId::new("1.2"), TaskId::new("2.1")]);
    }

    #[test]
    fn test_primary_file() {
        let task = Task::new("1.1", "Create a").with_files(["a.py", "b.py"]);
        assert_eq!(task.primary_file(), Some("a.py"));

        let empty = Task::new("1.2", "No files");
        assert_eq!(empty.primary_file(), None);
    }

    #[test]
    fn test_flatten_preserves_order() {
        let phases = vec![
            Phase {
                name: "one".to_string(),
                description: String::new(),
                tasks: vec![Task::new("1.1", "a"), Task::new("1.2", "b")],
            },
            Phase {
                name: "two".to_string(),
                description: String::new(),
                tasks: vec![Task::new("2.1", "c")],
            },
        ];

        let ids: Vec<String> = Phase::flatten(&phases)
            .into_iter()
            .map(|t| t.id.into_inner())
            .collect();
        assert_eq!(ids, vec!["1.1", "1.2", "2.1"]);
    }

    #[test]
    fn test_task_id_serializes_as_string() {
        let json = serde_json::to_string(&TaskId::new("3.4")).unwrap();
        assert_eq!(json, "\"3.4\"");
    }
}
