//! Core error taxonomy

use thiserror::Error;

/// Errors surfaced by the core services
#[derive(Error, Debug)]
pub enum CoreError {
    /// Caller supplied a bad enum value, malformed bounding box, unknown
    /// patch field, etc. Rejected before any I/O.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A mutation was attempted without a resolved viewer, or the supplied
    /// credential failed verification
    #[error("Authentication required")]
    Unauthenticated,

    /// Ownership violation or self-referential edge
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Target entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// An external HTTP dependency failed or timed out. The message is
    /// deliberately generic; upstream details go to the log only.
    #[error("Upstream service unavailable: {0}")]
    UpstreamUnavailable(&'static str),

    /// Concurrent mutation race on a unique constraint
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Outcome of an edge toggle or entity mutation, surfaced to the caller
#[derive(Debug, Clone, serde::Serialize)]
pub struct MutationOutcome {
    pub success: bool,
    pub message: String,
}

impl MutationOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}
