//! Error types for the runtime layer.

/// Runtime storage error.
///
/// Cache operations log these and degrade to a miss. Progress-log writes
/// return them to the caller.
#[derive(thiserror::Error, Debug)]
pub enum RuntimeError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A file path would resolve outside the project root.
    #[error("Path traversal blocked: {0:?}")]
    PathEscape(String),

    /// The progress log could not be locked or the locking task failed.
    #[error("Lock error: {0}")]
    Lock(String),
}

/// Type alias for Result with RuntimeError.
pub type Result<T> = std::result::Result<T, RuntimeError>;
