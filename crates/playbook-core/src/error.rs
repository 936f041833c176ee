use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaybookError {
    #[error("not initialized: run 'playbook init'")]
    NotInitialized,

    #[error("delta not found: {0}")]
    DeltaNotFound(String),

    #[error("delta already exists: {0}")]
    DeltaExists(String),

    #[error("invalid delta id '{0}': must be 1-64 chars of letters, digits, '.', '_' or '-'")]
    InvalidId(String),

    #[error("invalid delta: {0}")]
    InvalidDelta(String),

    #[error("target document not found: {}", .0.display())]
    TargetMissing(PathBuf),

    #[error("malformed pattern section in {}: {reason}", path.display())]
    MalformedSection { path: PathBuf, reason: String },

    #[error("delta store is corrupt ({}): {reason}", path.display())]
    CorruptStore { path: PathBuf, reason: String },

    #[error("timed out waiting for lock on {}", .0.display())]
    LockTimeout(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PlaybookError>;
