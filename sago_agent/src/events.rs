//! Orchestration events and sinks.
//!
//! Events are emitted at every task and wave transition. The JSONL sink
//! appends one object per line to a trace file:
//!
//! ```text
//! {"event_type":"task_started","timestamp":"...","run_id":"...","source":"attempt","data":{...}}
//! ```

use crate::collab::EventSink;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Kind of orchestration event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TaskStarted,
    CacheHit,
    GenerationFailed,
    VerificationFailed,
    RepairApplied,
    TaskSucceeded,
    TaskFailed,
    WaveStarted,
    WorkflowCompleted,
    WorkflowAborted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TaskStarted => "task_started",
            EventKind::CacheHit => "cache_hit",
            EventKind::GenerationFailed => "generation_failed",
            EventKind::VerificationFailed => "verification_failed",
            EventKind::RepairApplied => "repair_applied",
            EventKind::TaskSucceeded => "task_succeeded",
            EventKind::TaskFailed => "task_failed",
            EventKind::WaveStarted => "wave_started",
            EventKind::WorkflowCompleted => "workflow_completed",
            EventKind::WorkflowAborted => "workflow_aborted",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink that drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn record_event(&self, _kind: EventKind, _source: &str, _payload: serde_json::Value) {}
}

/// One line of the JSONL trace.
#[derive(Debug, Serialize)]
struct TraceRecord<'a> {
    event_type: EventKind,
    timestamp: DateTime<Utc>,
    run_id: Option<String>,
    source: &'a str,
    data: serde_json::Value,
}

/// Appends events as JSON lines to a trace file.
///
/// Writes are serialized through a mutex; failures are logged and dropped.
pub struct JsonlEventSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlEventSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn append(&self, line: &[u8]) -> std::io::Result<()> {
        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line).await?;
        file.flush().await
    }
}

#[async_trait]
impl EventSink for JsonlEventSink {
    async fn record_event(&self, kind: EventKind, source: &str, payload: serde_json::Value) {
        let record = TraceRecord {
            event_type: kind,
            timestamp: Utc::now(),
            run_id: payload
                .get("run_id")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            source,
            data: payload,
        };

        let mut line = match serde_json::to_vec(&record) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Failed to serialize trace event: {}", e);
                return;
            }
        };
        line.push(b'\n');

        if let Err(e) = self.append(&line).await {
            tracing::warn!("Failed to write trace event to {}: {}", self.path.display(), e);
        }
    }
}

/// Stamps every event with the current run id before handing it to a sink.
#[derive(Clone)]
pub struct EventEmitter {
    sink: Arc<dyn EventSink>,
    run_id: Uuid,
}

impl EventEmitter {
    pub fn new(sink: Arc<dyn EventSink>, run_id: Uuid) -> Self {
        Self { sink, run_id }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub async fn emit(&self, kind: EventKind, source: &str, data: serde_json::Value) {
        let mut payload = match data {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        payload.insert(
            "run_id".to_string(),
            serde_json::Value::String(self.run_id.to_string()),
        );

        tracing::debug!(event = %kind, source, "event");
        self.sink
            .record_event(kind, source, serde_json::Value::Object(payload))
            .await;
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("run_id", &self.run_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_event_kind_names() {
        assert_eq!(EventKind::TaskStarted.to_string(), "task_started");
        assert_eq!(
            serde_json::to_value(EventKind::WorkflowAborted).unwrap(),
            json!("workflow_aborted")
        );
    }

    #[tokio::test]
    async fn test_jsonl_sink_writes_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("trace/events.jsonl");
        let sink: Arc<dyn EventSink> = Arc::new(JsonlEventSink::new(&path));
        let run_id = Uuid::new_v4();
        let emitter = EventEmitter::new(sink, run_id);

        emitter
            .emit(EventKind::TaskStarted, "attempt", json!({"task_id": "1.1"}))
            .await;
        emitter
            .emit(EventKind::WorkflowCompleted, "coordinator", serde_json::Value::Null)
            .await;

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event_type"], "task_started");
        assert_eq!(lines[0]["source"], "attempt");
        assert_eq!(lines[0]["run_id"], run_id.to_string());
        assert_eq!(lines[0]["data"]["task_id"], "1.1");
        assert_eq!(lines[1]["event_type"], "workflow_completed");
    }

    #[tokio::test]
    async fn test_unwritable_trace_is_ignored() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("file");
        tokio::fs::write(&blocker, b"x").await.unwrap();

        // Parent is a regular file, so every write fails.
        let sink = JsonlEventSink::new(blocker.join("events.jsonl"));
        sink.record_event(EventKind::TaskFailed, "attempt", json!({}))
            .await;
    }
}
