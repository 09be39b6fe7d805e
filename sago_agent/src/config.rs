//! Orchestrator configuration.
//!
//! Loaded from YAML (every field optional) and then overridden from
//! `SAGO_*` environment variables.
//!
//! ```yaml
//! max_retries: 3
//! parallel: true
//! max_concurrency: 8
//! use_cache: true
//! cache_ttl_hours: 12
//! ```

use crate::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings for one orchestration run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Run the task's verify command after generation
    pub verify: bool,
    pub verify_timeout_secs: u64,
    /// Limit for each generation or repair call
    pub task_timeout_secs: u64,
    /// Run a wave's tasks concurrently
    pub parallel: bool,
    /// Tasks in flight per wave when parallel
    pub max_concurrency: usize,
    /// Keep running later waves after a failure
    pub continue_on_failure: bool,
    pub use_cache: bool,
    pub cache_dir: PathBuf,
    pub cache_ttl_hours: u64,
    pub git_commit: bool,
    /// Consult the repairer between attempts
    pub self_heal: bool,
    /// Progress log path, relative to the project root unless absolute
    pub progress_file: PathBuf,
    /// Skip tasks already recorded as passed in the progress log
    pub resume: bool,
    pub log_level: String,
    /// JSONL event trace path
    pub trace_file: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            verify: true,
            verify_timeout_secs: 30,
            task_timeout_secs: 300,
            parallel: false,
            max_concurrency: 4,
            continue_on_failure: false,
            use_cache: false,
            cache_dir: default_cache_dir(),
            cache_ttl_hours: 24,
            git_commit: false,
            self_heal: false,
            progress_file: PathBuf::from("STATE.md"),
            resume: false,
            log_level: "info".to_string(),
            trace_file: None,
        }
    }
}

/// `~/.sago/cache`, or `.sago/cache` when there is no home directory.
pub fn default_cache_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(".sago").join("cache"),
        None => PathBuf::from(".sago").join("cache"),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AgentError::Config(format!(
            "{} must be a boolean, got {:?}",
            key, other
        ))),
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AgentError::Config(format!("{} must be a number, got {:?}", key, value)))
}

impl OrchestratorConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Applies `SAGO_*` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies `SAGO_*` overrides from an arbitrary lookup.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SAGO_MAX_RETRIES") {
            self.max_retries = parse_num("SAGO_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("SAGO_VERIFY") {
            self.verify = parse_bool("SAGO_VERIFY", &v)?;
        }
        if let Some(v) = lookup("SAGO_VERIFY_TIMEOUT") {
            self.verify_timeout_secs = parse_num("SAGO_VERIFY_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("SAGO_TASK_TIMEOUT") {
            self.task_timeout_secs = parse_num("SAGO_TASK_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("SAGO_PARALLEL") {
            self.parallel = parse_bool("SAGO_PARALLEL", &v)?;
        }
        if let Some(v) = lookup("SAGO_MAX_CONCURRENCY") {
            self.max_concurrency = parse_num("SAGO_MAX_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("SAGO_CONTINUE_ON_FAILURE") {
            self.continue_on_failure = parse_bool("SAGO_CONTINUE_ON_FAILURE", &v)?;
        }
        if let Some(v) = lookup("SAGO_USE_CACHE") {
            self.use_cache = parse_bool("SAGO_USE_CACHE", &v)?;
        }
        if let Some(v) = lookup("SAGO_CACHE_DIR") {
            self.cache_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("SAGO_CACHE_TTL_HOURS") {
            self.cache_ttl_hours = parse_num("SAGO_CACHE_TTL_HOURS", &v)?;
        }
        if let Some(v) = lookup("SAGO_GIT_COMMIT") {
            self.git_commit = parse_bool("SAGO_GIT_COMMIT", &v)?;
        }
        if let Some(v) = lookup("SAGO_SELF_HEAL") {
            self.self_heal = parse_bool("SAGO_SELF_HEAL", &v)?;
        }
        if let Some(v) = lookup("SAGO_LOG_LEVEL") {
            self.log_level = v;
        }
        Ok(self)
    }

    /// Rejects values the coordinator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(AgentError::Config("max_concurrency must be at least 1".into()));
        }
        if self.verify_timeout_secs == 0 {
            return Err(AgentError::Config("verify_timeout_secs must be positive".into()));
        }
        if self.task_timeout_secs == 0 {
            return Err(AgentError::Config("task_timeout_secs must be positive".into()));
        }
        if self.cache_ttl_hours == 0 {
            return Err(AgentError::Config("cache_ttl_hours must be positive".into()));
        }
        Ok(())
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    /// Cache entry lifetime. Absurdly large values saturate.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_hours.saturating_mul(3600))
    }

    /// Installs the global tracing subscriber at `log_level`.
    pub fn init_tracing(&self) -> bool {
        crate::logging::init_tracing(&self.log_level)
    }

    /// Total generation attempts per task.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}
