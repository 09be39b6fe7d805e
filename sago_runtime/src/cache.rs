//! Content-addressed result cache with TTL expiration.
//!
//! Entries live as one JSON file per key under the cache directory, so a
//! corrupt entry never affects another. Caching is an optimization only:
//! every read or write failure is logged and degrades to a miss.
//!
//! # Examples
//!
//! ```no_run
//! use sago_runtime::cache::{CachedResult, ResultCache, TaskFingerprint};
//! use sago_runtime::snapshot::FileMap;
//! use sago_core::Task;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let cache = ResultCache::new("/tmp/sago-cache", Duration::from_secs(24 * 3600));
//! let task = Task::new("1.1", "Create a").with_files(["a.py"]);
//! let key = TaskFingerprint::new(&task, &FileMap::new()).key();
//!
//! if cache.get(&key).await.is_none() {
//!     cache.put(&key, &CachedResult::success(FileMap::new())).await;
//! }
//! # }
//! ```

use crate::metrics::{CacheEvent, CacheMetrics};
use crate::snapshot::FileMap;
use chrono::{DateTime, Utc};
use sago_core::Task;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Stable cache key: hex SHA-256 of a [`TaskFingerprint`].
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 hex characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The inputs that identify a task result.
///
/// The file list is sorted so declaration order does not matter. Current
/// file contents are included so a hand-edited file invalidates the entry.
#[derive(Clone, Debug, Serialize)]
pub struct TaskFingerprint {
    id: String,
    name: String,
    action: String,
    files: Vec<String>,
    verify: String,
    done: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_contents: Option<BTreeMap<String, String>>,
}

impl TaskFingerprint {
    /// Builds a fingerprint from a task and the current contents of its files.
    pub fn new(task: &Task, contents: &FileMap) -> Self {
        let mut files = task.files.clone();
        files.sort();

        Self {
            id: task.id.as_str().to_string(),
            name: task.name.clone(),
            action: task.action.clone(),
            files,
            verify: task.verify.clone(),
            done: task.done.clone(),
            file_contents: if contents.is_empty() {
                None
            } else {
                Some(contents.clone())
            },
        }
    }

    /// Hashes the fingerprint.
    pub fn key(&self) -> CacheKey {
        // Struct fields serialize in declaration order and maps are ordered,
        // so the encoding is canonical.
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&encoded);
        CacheKey(format!("{:x}", digest))
    }
}

/// Cached outcome of a successful attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedResult {
    pub success: bool,
    /// Files the attempt changed, with their final content
    #[serde(default)]
    pub files: FileMap,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl CachedResult {
    pub fn success(files: FileMap) -> Self {
        Self {
            success: true,
            files,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// On-disk record layout.
#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    timestamp: DateTime<Utc>,
    task_hash: String,
    result: CachedResult,
}

/// Aggregate view of the cache directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub total_size_bytes: u64,
    pub cache_dir: PathBuf,
}

/// File-backed result cache.
///
/// Cheap to clone; clones share the directory and metrics.
#[derive(Clone, Debug)]
pub struct ResultCache {
    dir: PathBuf,
    ttl: Duration,
    metrics: CacheMetrics,
}

impl ResultCache {
    /// Creates a cache rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
            metrics: CacheMetrics::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.as_str()))
    }

    fn is_expired(&self, timestamp: DateTime<Utc>) -> bool {
        // A timestamp in the future yields an error here and counts as fresh.
        (Utc::now() - timestamp)
            .to_std()
            .map(|age| age > self.ttl)
            .unwrap_or(false)
    }

    /// Gets a cached result if present and not expired.
    ///
    /// Expired entries are deleted. Unreadable entries are misses.
    pub async fn get(&self, key: &CacheKey) -> Option<CachedResult> {
        let path = self.entry_path(key);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Error reading cache: {}", e);
                }
                tracing::debug!("Cache miss: {}", key.short());
                self.metrics.record(CacheEvent::Miss);
                return None;
            }
        };

        let record: CacheRecord = match serde_json::from_slice(&bytes) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Error reading cache: {}", e);
                self.metrics.record(CacheEvent::Corrupt);
                return None;
            }
        };

        if self.is_expired(record.timestamp) {
            tracing::info!("Cache expired: {}", key.short());
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::debug!("Could not remove expired cache entry: {}", e);
            }
            self.metrics.record(CacheEvent::Expired);
            return None;
        }

        tracing::info!("Cache hit: {}", key.short());
        self.metrics.record(CacheEvent::Hit);
        Some(record.result)
    }

    /// Stores a result. Failures are logged and swallowed.
    pub async fn put(&self, key: &CacheKey, result: &CachedResult) {
        match self.try_put(key, result).await {
            Ok(()) => {
                tracing::info!("Cached result: {}", key.short());
                self.metrics.record(CacheEvent::Store);
            }
            Err(e) => {
                tracing::warn!("Error writing cache: {}", e);
                self.metrics.record(CacheEvent::StoreFailed);
            }
        }
    }

    async fn try_put(&self, key: &CacheKey, result: &CachedResult) -> crate::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let record = CacheRecord {
            timestamp: Utc::now(),
            task_hash: key.as_str().to_string(),
            result: result.clone(),
        };
        let json = serde_json::to_vec_pretty(&record)?;

        // Write-then-rename so readers never observe a partial entry.
        let path = self.entry_path(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Removes one entry if present.
    pub async fn invalidate(&self, key: &CacheKey) {
        if tokio::fs::remove_file(self.entry_path(key)).await.is_ok() {
            tracing::info!("Invalidated cache: {}", key.short());
        }
    }

    /// Lists entry files in the cache directory.
    async fn entry_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&self.dir).await else {
            return files;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files
    }

    async fn read_record(path: &Path) -> Option<CacheRecord> {
        let bytes = tokio::fs::read(path).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Deletes every entry. Returns the number removed.
    pub async fn clear_all(&self) -> usize {
        let mut count = 0;
        for path in self.entry_files().await {
            if tokio::fs::remove_file(&path).await.is_ok() {
                count += 1;
            }
        }
        tracing::info!("Cleared {} cache files", count);
        count
    }

    /// Deletes expired entries. Returns the number removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut count = 0;
        for path in self.entry_files().await {
            match Self::read_record(&path).await {
                Some(record) if self.is_expired(record.timestamp) => {
                    if tokio::fs::remove_file(&path).await.is_ok() {
                        count += 1;
                    }
                }
                Some(_) => {}
                None => tracing::warn!("Error cleaning cache file {}", path.display()),
            }
        }
        tracing::info!("Cleaned up {} expired cache entries", count);
        count
    }

    /// Deletes every entry whose cached files include `file_path`.
    pub async fn invalidate_by_file(&self, file_path: &str) -> usize {
        let mut count = 0;
        for path in self.entry_files().await {
            let Some(record) = Self::read_record(&path).await else {
                continue;
            };
            if record.result.files.contains_key(file_path)
                && tokio::fs::remove_file(&path).await.is_ok()
            {
                count += 1;
            }
        }
        tracing::info!("Invalidated {} cache entries for {}", count, file_path);
        count
    }

    /// Summarizes the cache directory.
    pub async fn stats(&self) -> CacheStats {
        let files = self.entry_files().await;
        let mut total_size_bytes = 0;
        let mut expired_entries = 0;

        for path in &files {
            if let Ok(meta) = tokio::fs::metadata(path).await {
                total_size_bytes += meta.len();
            }
            if let Some(record) = Self::read_record(path).await {
                if self.is_expired(record.timestamp) {
                    expired_entries += 1;
                }
            }
        }

        CacheStats {
            total_entries: files.len(),
            expired_entries,
            total_size_bytes,
            cache_dir: self.dir.clone(),
        }
    }
}
