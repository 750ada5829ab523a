//! Storage error types.
//!
//! Every error variant carries enough context to diagnose the problem
//! without a debugger. Reasons may contain backend text (SQL errors), so
//! callers above the storage layer must not forward them to clients.

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to open or migrate the storage backend.
    #[error("failed to open storage at '{path}': {reason}")]
    Open { path: String, reason: String },

    /// A row addressed by id does not exist.
    #[error("{what} not found")]
    NotFound { what: String },

    /// A uniqueness constraint rejected the write.
    #[error("{what} already exists")]
    AlreadyExists { what: String },

    /// A query failed in the backend.
    #[error("{op} failed: {reason}")]
    Query { op: &'static str, reason: String },
}
