//! Durable progress log.
//!
//! A markdown file with one line per finished task beneath a
//! `## Completed Tasks` header. Every append holds an exclusive lock on the
//! file for the whole read-splice-rewrite cycle, so concurrent completions
//! from one wave cannot interleave.
//!
//! ```text
//! # Project State
//!
//! ## Completed Tasks
//!
//!
//! - [✓] 1.1: Create config (2026-01-01 12:00:00)
//! - [✗] 1.2: Add loader (2026-01-01 12:00:04)
//!   - Error: verification failed (exit 1): assertion error
//! ```

use crate::error::{Result, RuntimeError};
use sago_core::{Task, TaskId};
use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const SECTION: &str = "## Completed Tasks";
const INITIAL: &str = "# Project State\n\n## Completed Tasks\n\n";
const PASS_MARK: &str = "✓";
const FAIL_MARK: &str = "✗";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One finished task as recorded in the log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressEntry {
    pub task_id: TaskId,
    pub name: String,
    pub passed: bool,
    /// Local time, `YYYY-mm-dd HH:MM:SS`
    pub timestamp: String,
    pub error: Option<String>,
}

impl ProgressEntry {
    /// Creates an entry stamped with the current local time.
    ///
    /// Multi-line error text is folded onto one line.
    pub fn new(task: &Task, passed: bool, error: Option<String>) -> Self {
        Self {
            task_id: task.id.clone(),
            name: task.name.clone(),
            passed,
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            error: error.map(|e| single_line(&e)).filter(|e| !e.is_empty()),
        }
    }

    /// Renders the entry. Every field lands on its own line, so text from
    /// the task can never forge a separate entry.
    fn render(&self) -> String {
        let mark = if self.passed { PASS_MARK } else { FAIL_MARK };
        let mut line = format!(
            "\n- [{}] {}: {} ({})",
            mark,
            single_line(self.task_id.as_str()),
            single_line(&self.name),
            self.timestamp
        );
        if let Some(error) = self.error.as_deref().map(single_line).filter(|e| !e.is_empty()) {
            line.push_str(&format!("\n  - Error: {}", error));
        }
        line
    }

    fn parse_line(line: &str) -> Option<Self> {
        let rest = line.trim_start().strip_prefix("- [")?;
        let (mark, rest) = rest.split_once("] ")?;
        let passed = match mark {
            PASS_MARK => true,
            FAIL_MARK => false,
            _ => return None,
        };

        let (id, rest) = rest.split_once(": ")?;
        let (name, timestamp) = match rest.rfind(" (") {
            Some(pos) if rest.ends_with(')') => (&rest[..pos], &rest[pos + 2..rest.len() - 1]),
            _ => (rest, ""),
        };

        Some(Self {
            task_id: TaskId::new(id.trim()),
            name: name.to_string(),
            passed,
            timestamp: timestamp.to_string(),
            error: None,
        })
    }
}

/// Joins the non-blank lines of `text` with single spaces.
fn single_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Inserts a rendered entry at the end of the completed-tasks section.
fn splice(content: &str, rendered: &str) -> String {
    let content = if content.is_empty() { INITIAL } else { content };

    let Some(start) = content.find(SECTION) else {
        return format!("{}\n{}\n{}", content, SECTION, rendered);
    };

    let body_start = start + SECTION.len();
    let section_end = content[body_start..]
        .find("\n## ")
        .map(|offset| body_start + offset)
        .unwrap_or(content.len());

    let mut updated = String::with_capacity(content.len() + rendered.len());
    updated.push_str(&content[..section_end]);
    updated.push_str(rendered);
    updated.push_str(&content[section_end..]);
    updated
}

fn append_locked(path: &Path, entry: &ProgressEntry) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;

    file.lock()
        .map_err(|e| RuntimeError::Lock(format!("{}: {}", path.display(), e)))?;

    let mut content = String::new();
    file.read_to_string(&mut content)?;
    let updated = splice(&content, &entry.render());

    file.seek(SeekFrom::Start(0))?;
    file.set_len(0)?;
    file.write_all(updated.as_bytes())?;
    file.sync_all()?;

    // Dropping the handle releases the lock as well.
    file.unlock()?;
    Ok(())
}

/// Append-only record of task outcomes.
#[derive(Clone, Debug)]
pub struct ProgressLog {
    path: PathBuf,
}

impl ProgressLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry under an exclusive file lock.
    pub async fn append(&self, entry: ProgressEntry) -> Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || append_locked(&path, &entry))
            .await
            .map_err(|e| RuntimeError::Lock(format!("progress writer panicked: {}", e)))?
    }

    /// Records a task outcome.
    pub async fn record(&self, task: &Task, passed: bool, error: Option<String>) -> Result<()> {
        self.append(ProgressEntry::new(task, passed, error)).await
    }

    /// Parses every entry in file order. A missing file has no entries.
    pub async fn entries(&self) -> Result<Vec<ProgressEntry>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries: Vec<ProgressEntry> = Vec::new();
        for line in content.lines() {
            if let Some(error) = line.trim_start().strip_prefix("- Error: ") {
                if line.starts_with("  ") {
                    if let Some(last) = entries.last_mut() {
                        last.error = Some(error.to_string());
                    }
                    continue;
                }
            }
            if let Some(entry) = ProgressEntry::parse_line(line) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Ids whose most recent entry is a pass.
    pub async fn passed_task_ids(&self) -> Result<BTreeSet<TaskId>> {
        let mut passed = BTreeSet::new();
        for entry in self.entries().await? {
            if entry.passed {
                passed.insert(entry.task_id);
            } else {
                passed.remove(&entry.task_id);
            }
        }
        Ok(passed)
    }
}
