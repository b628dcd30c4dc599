//! Global configuration document.

use std::collections::HashMap;

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use crate::{
    error::{Result, StoreError},
    json_store::JsonStore,
};

/// Ordering of the dashboard top list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TopListOrder {
    /// Most recently run first.
    #[default]
    Last,
    /// Most frequently run first.
    Most,
}

/// User-tunable settings, persisted as `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Domains remote plugin sources may come from.
    pub trusted_domains: Vec<String>,
    /// Detected interpreter paths, filled in by layout initialisation.
    pub runtime_paths: HashMap<String, String>,
    pub sort_by: String,
    pub items_per_page: usize,
    pub show_last_runs: bool,
    /// Size of the dashboard top list.
    pub fav_limit: usize,
    pub last_run_order: TopListOrder,
    pub last_run_limit: usize,
    pub history_size: usize,
    /// Interpreter name to the command probed for on PATH.
    pub supported_runtimes: HashMap<String, String>,
    pub splash: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trusted_domains: vec!["github.com".to_string(), "gitlab.com".to_string()],
            runtime_paths: HashMap::new(),
            sort_by: "name".to_string(),
            items_per_page: 10,
            show_last_runs: true,
            fav_limit: 5,
            last_run_order: TopListOrder::Last,
            last_run_limit: 10,
            history_size: 50,
            supported_runtimes: default_runtimes(),
            splash: true,
        }
    }
}

fn default_runtimes() -> HashMap<String, String> {
    HashMap::from([
        ("python".to_string(), "python3".to_string()),
        ("node".to_string(), "node".to_string()),
        ("r".to_string(), "Rscript".to_string()),
    ])
}

/// Persistence seam for the configuration singleton.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read the config, creating and persisting defaults if none exists.
    async fn read(&self) -> Result<Config>;
    async fn write(&self, config: &Config) -> Result<()>;
}

const CONFIG_KEY: &str = "config.json";

/// File-backed config store over the `config.json` singleton.
pub struct FileConfigStore {
    store: JsonStore,
}

impl FileConfigStore {
    pub fn new(base_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            store: JsonStore::new(base_dir),
        }
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn read(&self) -> Result<Config> {
        match self.store.read(CONFIG_KEY).await {
            Ok(config) => Ok(config),
            Err(StoreError::NotFound(_)) => {
                debug!("no config on disk, creating defaults");
                let config = Config::default();
                self.write(&config).await?;
                Ok(config)
            },
            Err(e) => Err(e),
        }
    }

    async fn write(&self, config: &Config) -> Result<()> {
        self.store.write(CONFIG_KEY, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_miss_creates_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(tmp.path());
        let config = store.read().await.unwrap();
        assert_eq!(config.items_per_page, 10);
        assert_eq!(config.last_run_order, TopListOrder::Last);
        assert!(tmp.path().join("config.json").is_file());
    }

    #[tokio::test]
    async fn partial_documents_fill_in_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.json"),
            r#"{"itemsPerPage": 25, "lastRunOrder": "most"}"#,
        )
        .unwrap();
        let store = FileConfigStore::new(tmp.path());
        let config = store.read().await.unwrap();
        assert_eq!(config.items_per_page, 25);
        assert_eq!(config.last_run_order, TopListOrder::Most);
        assert_eq!(config.history_size, 50);
    }
}
