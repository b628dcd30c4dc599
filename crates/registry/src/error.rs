use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("plugin not found: {0}")]
    NotFound(String),

    #[error("plugin already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid plugin manifest: {0}")]
    InvalidManifest(String),

    #[error("source is not a plugin directory: {0}")]
    InvalidSource(PathBuf),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
