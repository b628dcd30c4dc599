//! The plugin management service and its collaborator wiring.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    anyhow::{Result, bail},
    tracing::{debug, info, warn},
};

use {
    runbox_registry::{FsPluginRepository, Plugin, PluginRepository},
    runbox_runner::{DependencyInstaller, FsInstaller, PluginRunner, ProcessRunner},
    runbox_store::{
        ConfigStore, FileConfigStore, FileStateStore, FileUsageStore, PluginState, StateStore,
        TopListOrder, UsageStore,
    },
};

use crate::types::{Dashboard, PluginInfo, PluginListItem};

/// Orchestrates plugin runs and administration.
///
/// Collaborators are held behind their trait seams so tests and
/// alternative backends can swap them out.
pub struct PluginService {
    pub(crate) base_dir: PathBuf,
    pub(crate) repo: Arc<dyn PluginRepository>,
    pub(crate) state: Arc<dyn StateStore>,
    pub(crate) usage: Arc<dyn UsageStore>,
    pub(crate) config: Arc<dyn ConfigStore>,
    pub(crate) runner: Arc<dyn PluginRunner>,
    pub(crate) installer: Arc<dyn DependencyInstaller>,
}

impl PluginService {
    /// Wire the file-backed implementations under one base directory.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            repo: Arc::new(FsPluginRepository::new(&base_dir)),
            state: Arc::new(FileStateStore::new(&base_dir)),
            usage: Arc::new(FileUsageStore::new(&base_dir)),
            config: Arc::new(FileConfigStore::new(&base_dir)),
            runner: Arc::new(ProcessRunner::new(&base_dir)),
            installer: Arc::new(FsInstaller::new(&base_dir)),
            base_dir,
        }
    }

    /// Wire explicit collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        base_dir: impl Into<PathBuf>,
        repo: Arc<dyn PluginRepository>,
        state: Arc<dyn StateStore>,
        usage: Arc<dyn UsageStore>,
        config: Arc<dyn ConfigStore>,
        runner: Arc<dyn PluginRunner>,
        installer: Arc<dyn DependencyInstaller>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            repo,
            state,
            usage,
            config,
            runner,
            installer,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Install a plugin from a local source directory, gating
    /// remote-looking sources on the trusted domain list.
    pub async fn add_plugin(&self, source: &str) -> Result<Plugin> {
        if source.is_empty() {
            bail!("source path is required");
        }
        if looks_remote(source) {
            let domain = source_domain(source);
            if let Ok(config) = self.config.read().await {
                let trusted = config.trusted_domains.iter().any(|d| domain.contains(d.as_str()));
                if !trusted {
                    bail!("domain not trusted: {domain}");
                }
            }
        }

        let plugin = self.repo.add(Path::new(source)).await?;
        // A fresh state document so the plugin lists with zeroed counters.
        if let Err(e) = self.state.write(&PluginState::new(&plugin.name)).await {
            warn!(plugin = %plugin.name, error = %e, "plugin added but state init failed");
        }
        info!(plugin = %plugin.name, "plugin added");
        Ok(plugin)
    }

    /// Remove a plugin: registry entry, state document, usage entries,
    /// and optionally its installed dependencies.
    pub async fn delete_plugin(&self, name: &str, remove_deps: bool) -> Result<()> {
        if !self.repo.exists(name).await {
            bail!("plugin not found: {name}");
        }

        if remove_deps {
            if let Ok(plugin) = self.repo.get(name).await
                && let Err(e) = self.installer.uninstall(&plugin).await
            {
                warn!(plugin = name, error = %e, "shared dependency cleanup failed");
            }
            if let Err(e) = self.repo.remove_deps(name).await {
                warn!(plugin = name, error = %e, "local dependency cleanup failed");
            }
        }

        self.repo.remove(name).await?;

        if let Err(e) = self.state.delete(name).await {
            debug!(plugin = name, error = %e, "no state document to delete");
        }
        match self.usage.read().await {
            Ok(mut stats) => {
                if stats.remove_plugin(name)
                    && let Err(e) = self.usage.write(&stats).await
                {
                    warn!(error = %e, "failed to prune usage stats");
                }
            },
            Err(e) => debug!(error = %e, "skipping usage prune"),
        }

        info!(plugin = name, "plugin deleted");
        Ok(())
    }

    /// Install dependencies for one plugin.
    pub async fn install_deps(&self, name: &str) -> Result<()> {
        let plugin = self.repo.get(name).await?;
        self.installer.install(&plugin).await
    }

    /// Metadata, state summary, and recent history (newest first).
    pub async fn plugin_info(&self, name: &str, history_limit: usize) -> Result<PluginInfo> {
        let plugin = self.repo.get(name).await?;
        let state = self.state.read(name).await?;
        let limit = if history_limit == 0 { 10 } else { history_limit };
        let recent_history = state.history.iter().rev().take(limit).cloned().collect();
        Ok(PluginInfo {
            last_executed_at_ms: state.last_executed_at_ms,
            run_count: state.run_count,
            most_recent_args: state.most_recent_args().map(str::to_string),
            recent_history,
            plugin,
        })
    }

    /// Dashboard listing: a ranked top list (recency or frequency, per
    /// config) and the remaining plugins alphabetically, paginated.
    pub async fn list_plugins(&self, page: usize, page_size: usize) -> Result<Dashboard> {
        let config = self.config.read().await?;
        let page = page.max(1);
        let page_size = if page_size > 0 {
            page_size
        } else if config.items_per_page > 0 {
            config.items_per_page
        } else {
            10
        };

        let plugins = self.repo.list().await?;
        let mut items = Vec::with_capacity(plugins.len());
        for plugin in &plugins {
            let state = self.state.read(&plugin.name).await.ok();
            items.push(PluginListItem {
                name: plugin.name.clone(),
                interpreter: plugin.interpreter.clone(),
                description: plugin.description.clone(),
                usage: plugin.usage.clone(),
                last_run_ms: state.as_ref().map(|s| s.last_executed_at_ms).unwrap_or_default(),
                run_count: state.map(|s| s.run_count).unwrap_or_default(),
            });
        }

        let mut top = Vec::new();
        if config.show_last_runs
            && let Ok(stats) = self.usage.read().await
        {
            let ranked = match config.last_run_order {
                TopListOrder::Most => &stats.most_used,
                TopListOrder::Last => &stats.recently_used,
            };
            for entry in ranked.iter().take(config.fav_limit) {
                if let Some(item) = items.iter().find(|i| i.name == entry.plugin_name) {
                    top.push(item.clone());
                }
            }
        }

        let mut main: Vec<PluginListItem> = items
            .into_iter()
            .filter(|item| !top.iter().any(|t| t.name == item.name))
            .collect();
        main.sort_by(|a, b| a.name.cmp(&b.name));

        let total_count = main.len();
        let total_pages = total_count.div_ceil(page_size).max(1);
        let start = (page - 1) * page_size;
        let main = if start >= main.len() {
            Vec::new()
        } else {
            main.into_iter().skip(start).take(page_size).collect()
        };

        Ok(Dashboard {
            show_top_list: config.show_last_runs,
            top,
            main,
            total_count,
            page,
            page_size,
            total_pages,
        })
    }
}

fn looks_remote(source: &str) -> bool {
    source.starts_with("http") || source.contains('@')
}

/// Best-effort host extraction from an http(s) URL or scp-like git source.
fn source_domain(source: &str) -> String {
    if let Ok(parsed) = url::Url::parse(source)
        && let Some(host) = parsed.host_str()
    {
        return host.to_string();
    }
    // git@host:path
    source
        .split_once('@')
        .map(|(_, rest)| rest.split([':', '/']).next().unwrap_or(rest).to_string())
        .unwrap_or_default()
}
