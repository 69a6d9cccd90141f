//! Error types for Squall

use thiserror::Error;

use crate::types::ShardId;

/// Result type alias using Squall's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Squall
#[derive(Error, Debug)]
pub enum Error {
    // Domain-level search errors, always user-facing
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    // Remote transport failures (connection refused, non-200, bad payload)
    #[error("Transport error: {0}")]
    Transport(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    // Not found
    #[error("{0} not found: {1}")]
    NotFound(String, String),

    // Cancellation is not a failure; it must never land in a node error list
    #[error("Operation cancelled: {0}")]
    Cancelled(String),
}

/// Domain errors raised while planning or executing a search.
///
/// Every variant carries a human-readable message suitable for the
/// per-node error list exposed to the caller.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("index shard marked as corrupt: id={0}")]
    ShardCorrupt(ShardId),

    #[error("index shard not found: id={0}")]
    ShardMissing(ShardId),

    #[error("no stored fields requested")]
    NoStoredFields,

    #[error("search expression missing")]
    ExpressionMissing,

    #[error("unsupported index format version: {0}")]
    UnsupportedFormat(u32),
}

impl Error {
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Error::NotFound(kind.into(), name.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Error::Cancelled(msg.into())
    }

    /// True when this error is a cooperative cancellation rather than a
    /// failure. Cancellations unwind cleanly and are never recorded
    /// against a node.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }
}
