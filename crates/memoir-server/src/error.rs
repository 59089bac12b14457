// crates/memoir-server/src/error.rs
// Standardized error types for Memoir

use thiserror::Error;

/// Main error type for the Memoir library
#[derive(Error, Debug)]
pub enum MemoirError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("runtime not initialized")]
    RuntimeNotInitialized,

    #[error("cannot compact an empty chunk list")]
    EmptyCompaction,

    #[error("unknown chunk ids: {}", .0.join(", "))]
    MissingChunks(Vec<String>),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown error: {0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Convenience type alias for Result using MemoirError
pub type Result<T> = std::result::Result<T, MemoirError>;

impl From<String> for MemoirError {
    fn from(s: String) -> Self {
        MemoirError::Other(s)
    }
}

impl From<tokio::task::JoinError> for MemoirError {
    fn from(err: tokio::task::JoinError) -> Self {
        MemoirError::Other(err.to_string())
    }
}

impl From<MemoirError> for String {
    fn from(err: MemoirError) -> Self {
        err.to_string()
    }
}
