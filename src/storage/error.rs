//! Storage error types.

use thiserror::Error;

/// Errors that can occur in a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend was closed and can no longer serve requests.
    #[error("storage is closed")]
    Closed,

    /// `ensure_db` has not been run for this generation.
    #[error("storage not initialized: {0}")]
    NotInitialized(&'static str),

    #[error("rocksdb error: {0}")]
    Rocks(#[from] rocksdb::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("invalid storage address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// A stored value could not be interpreted as a counter.
    #[error("corrupt value at '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// Some keys could not be deleted. Other pages were still attempted.
    #[error("tear down deleted {deleted} keys with {} failures: {}", failures.len(), failures.join("; "))]
    TearDown { deleted: u64, failures: Vec<String> },

    /// A blocking storage task panicked or was cancelled.
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
