//! Plugin registry: manifest parsing and filesystem-backed storage of
//! installed plugins.
//!
//! Installed plugins are directories under `<base>/plugins/<name>/`, each
//! carrying a `plugin.yml` manifest describing how to execute the script.

pub mod error;
pub mod manifest;
pub mod repository;
pub mod types;

pub use error::{RegistryError, Result};
pub use manifest::{MANIFEST_FILE, PluginManifest};
pub use repository::{FsPluginRepository, PluginRepository};
pub use types::Plugin;
