//! Plan document sources.
//!
//! A [`PlanSource`] turns a plan document into phases. Two formats are
//! built in: a YAML document and the `PLAN.md` markdown layout with an
//! embedded `<phases>` block. Other formats plug in through the trait.

use crate::error::{PlanError, Result};
use crate::task::{Phase, Task, TaskId};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parses a plan document into phases.
pub trait PlanSource: Send + Sync {
    fn parse(&self, document: &str) -> Result<Vec<Phase>>;
}

/// Plan definition from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlPlan {
    /// Plan phases in order
    pub phases: Vec<YamlPhase>,
}

/// Phase definition from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlPhase {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tasks: Vec<YamlTask>,
}

/// Task definition from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlTask {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub verify: String,
    #[serde(default)]
    pub done: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl YamlPhase {
    fn into_phase(self) -> Phase {
        let phase_name = self.name;
        let tasks = self
            .tasks
            .into_iter()
            .map(|t| Task {
                id: TaskId::new(t.id.trim()),
                name: t.name.trim().to_string(),
                files: t
                    .files
                    .into_iter()
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty())
                    .collect(),
                action: t.action.trim().to_string(),
                verify: t.verify.trim().to_string(),
                done: t.done.trim().to_string(),
                phase_name: phase_name.clone(),
                depends_on: t.depends_on.into_iter().map(TaskId::from).collect(),
            })
            .collect();

        Phase {
            name: phase_name,
            description: self.description.trim().to_string(),
            tasks,
        }
    }
}

/// YAML plan source.
#[derive(Clone, Debug, Default)]
pub struct YamlPlanSource;

impl YamlPlanSource {
    pub fn new() -> Self {
        Self
    }

    /// Reads and parses a plan file.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<Vec<Phase>> {
        let content = std::fs::read_to_string(path)?;
        self.parse(&content)
    }
}

impl PlanSource for YamlPlanSource {
    fn parse(&self, document: &str) -> Result<Vec<Phase>> {
        let plan: YamlPlan = serde_yaml::from_str(document)?;
        let phases: Vec<Phase> = plan.phases.into_iter().map(YamlPhase::into_phase).collect();

        if phases.iter().all(|p| p.tasks.is_empty()) {
            return Err(PlanError::InvalidPlan("No tasks found in plan".to_string()));
        }

        let task_count: usize = phases.iter().map(Phase::task_count).sum();
        tracing::info!("Found {} tasks across {} phases", task_count, phases.len());

        Ok(phases)
    }
}

fn pattern(source: &str) -> Result<Regex> {
    Regex::new(source).map_err(|e| PlanError::InvalidPlan(format!("Invalid pattern: {}", e)))
}

fn attribute(attrs: &str, name: &str) -> Option<String> {
    let pattern = format!(r#"\b{}\s*=\s*(?:"([^"]*)"|'([^']*)')"#, regex::escape(name));
    let re = Regex::new(&pattern).ok()?;
    let caps = re.captures(attrs)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| unescape(m.as_str()))
}

fn element(body: &str, tag: &str) -> Option<String> {
    let pattern = format!(r"(?s)<{0}\s*>(.*?)</{0}\s*>", regex::escape(tag));
    let re = Regex::new(&pattern).ok()?;
    re.captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| unescape(m.as_str().trim()))
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn split_list(text: &str, separators: &[char]) -> Vec<String> {
    text.split(separators)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// `PLAN.md` source.
///
/// Reads the first ```` ```xml ```` fenced block, or a bare `<phases>`
/// element when there is no fence:
///
/// ```xml
/// <phases>
///   <phase name="Foundation">
///     <description>Core modules</description>
///     <task id="1.1">
///       <name>Create config</name>
///       <files>
///         src/config.py
///         tests/test_config.py
///       </files>
///       <action>Write the loader</action>
///       <verify>pytest tests/test_config.py</verify>
///       <done>Config loads</done>
///     </task>
///   </phase>
/// </phases>
/// ```
///
/// `<files>` holds one path per line. An optional `<depends_on>` lists ids
/// separated by commas or whitespace.
#[derive(Clone, Debug, Default)]
pub struct MarkdownPlanSource;

impl MarkdownPlanSource {
    pub fn new() -> Self {
        Self
    }

    /// Reads and parses a `PLAN.md` file.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<Vec<Phase>> {
        let content = std::fs::read_to_string(path)?;
        self.parse(&content)
    }

    fn task_block<'a>(&self, document: &'a str) -> Result<&'a str> {
        let fence = pattern(r"(?s)```xml\s*(.*?)\s*```")?;
        let bare = pattern(r"(?s)(<phases\b.*?</phases>)")?;
        fence
            .captures(document)
            .and_then(|caps| caps.get(1))
            .or_else(|| bare.captures(document).and_then(|caps| caps.get(1)))
            .map(|m| m.as_str())
            .ok_or_else(|| PlanError::InvalidPlan("No XML task block found".to_string()))
    }
}

impl PlanSource for MarkdownPlanSource {
    fn parse(&self, document: &str) -> Result<Vec<Phase>> {
        let block = self.task_block(document)?;
        if !block.trim_start().starts_with("<phases") {
            return Err(PlanError::InvalidPlan(
                "Task block must have a <phases> root".to_string(),
            ));
        }

        let phase_pattern = pattern(r"(?s)<phase\b([^>]*)>(.*?)</phase>")?;
        let task_pattern = pattern(r"(?s)<task\b([^>]*)>(.*?)</task>")?;

        let mut phases = Vec::new();
        for phase_caps in phase_pattern.captures_iter(block) {
            let attrs = phase_caps.get(1).map_or("", |m| m.as_str());
            let body = phase_caps.get(2).map_or("", |m| m.as_str());
            let phase_name =
                attribute(attrs, "name").unwrap_or_else(|| "Unknown Phase".to_string());

            let tasks = task_pattern
                .captures_iter(body)
                .map(|task_caps| {
                    let attrs = task_caps.get(1).map_or("", |m| m.as_str());
                    let body = task_caps.get(2).map_or("", |m| m.as_str());
                    let text = |tag: &str| element(body, tag).unwrap_or_default();

                    Task {
                        id: TaskId::new(attribute(attrs, "id").unwrap_or_default().trim()),
                        name: text("name"),
                        files: split_list(&text("files"), &['\n']),
                        action: text("action"),
                        verify: text("verify"),
                        done: text("done"),
                        phase_name: phase_name.clone(),
                        depends_on: split_list(&text("depends_on"), &[',', ' ', '\n', '\t'])
                            .into_iter()
                            .map(TaskId::from)
                            .collect(),
                    }
                })
                .collect();

            phases.push(Phase {
                name: phase_name,
                description: element(body, "description").unwrap_or_default(),
                tasks,
            });
        }

        if phases.iter().all(|p| p.tasks.is_empty()) {
            return Err(PlanError::InvalidPlan("No tasks found in plan".to_string()));
        }

        let task_count: usize = phases.iter().map(Phase::task_count).sum();
        tracing::info!("Found {} tasks across {} phases", task_count, phases.len());

        Ok(phases)
    }
}
