use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A registered plugin: an external script plus the metadata needed to
/// execute it.
///
/// Owned by the registry and immutable for the lifetime of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Plugin {
    pub name: String,
    /// Raw interpreter string from the manifest (e.g. "python", "node").
    pub interpreter: String,
    pub description: String,
    /// Entry file, relative to the plugin directory.
    pub entry: String,
    /// Usage hint shown to the user.
    pub usage: String,
    /// Absolute path of the installed plugin directory.
    pub source: PathBuf,
    pub added_at_ms: u64,
}
