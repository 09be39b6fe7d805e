//! SagoKit runtime - Shared state used while executing a plan.
//!
//! - [`cache::ResultCache`]: content-addressed task results with a TTL
//! - [`metrics::CacheMetrics`]: cache hit/miss counters
//! - [`progress::ProgressLog`]: locked, append-style outcome log
//! - [`snapshot`]: file snapshots and root-confined writes

pub mod cache;
pub mod error;
pub mod metrics;
pub mod progress;
pub mod snapshot;

pub use cache::{CacheKey, CacheStats, CachedResult, ResultCache, TaskFingerprint};
pub use error::{Result, RuntimeError};
pub use metrics::{CacheEvent, CacheMetrics, MetricsSummary};
pub use progress::{ProgressEntry, ProgressLog};
pub use snapshot::FileMap;
