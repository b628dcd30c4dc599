use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The document does not exist. Callers use this to lazily initialize.
    #[error("document not found: {0}")]
    NotFound(PathBuf),

    /// The file exists but holds no bytes; never silently defaulted.
    #[error("document is empty: {0}")]
    Empty(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
