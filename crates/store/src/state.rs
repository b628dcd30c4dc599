//! Per-plugin execution state: run counters and a bounded, argument-
//! deduplicated run history.

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use crate::{
    error::{Result, StoreError},
    json_store::JsonStore,
    now_ms,
};

/// Default bound on a plugin's run history.
pub const DEFAULT_MAX_HISTORY: usize = 50;

/// Status of a single plugin run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
    Aborted,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }
}

/// One invocation of a plugin with a specific argument string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub timestamp_ms: u64,
    pub args: String,
    pub exit_code: i32,
    pub duration_ms: u64,
    pub status: RunStatus,
}

impl RunRecord {
    /// A freshly started run, not yet finalized.
    pub fn started(args: impl Into<String>) -> Self {
        Self {
            timestamp_ms: now_ms(),
            args: args.into(),
            exit_code: 0,
            duration_ms: 0,
            status: RunStatus::Running,
        }
    }
}

/// Per-plugin counters and bounded run history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginState {
    pub plugin_name: String,
    pub added_at_ms: u64,
    #[serde(default)]
    pub last_executed_at_ms: u64,
    #[serde(default)]
    pub run_count: u64,
    #[serde(default)]
    pub history: Vec<RunRecord>,
    #[serde(default = "default_max_history")]
    pub max_history_size: usize,
}

fn default_max_history() -> usize {
    DEFAULT_MAX_HISTORY
}

impl PluginState {
    pub fn new(plugin_name: impl Into<String>) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            added_at_ms: now_ms(),
            last_executed_at_ms: 0,
            run_count: 0,
            history: Vec::new(),
            max_history_size: DEFAULT_MAX_HISTORY,
        }
    }

    /// Append a run record, keeping history deduplicated by argument
    /// string and bounded by `max_history_size`.
    ///
    /// Any existing record with the same args is removed first, so history
    /// is a most-recently-used list keyed by argument string, not a plain
    /// log. The run counter always increments; overflow drops the oldest
    /// entries.
    pub fn push_record(&mut self, record: RunRecord) {
        self.history.retain(|r| r.args != record.args);
        self.last_executed_at_ms = record.timestamp_ms;
        self.history.push(record);
        self.run_count += 1;
        if self.history.len() > self.max_history_size {
            let excess = self.history.len() - self.max_history_size;
            self.history.drain(..excess);
        }
    }

    /// Arguments of the most recent run, if any.
    pub fn most_recent_args(&self) -> Option<&str> {
        self.history.last().map(|r| r.args.as_str())
    }
}

/// Persistence seam for per-plugin state.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read the state for `plugin_name`, creating and persisting a fresh
    /// document if none exists yet.
    async fn read(&self, plugin_name: &str) -> Result<PluginState>;
    async fn write(&self, state: &PluginState) -> Result<()>;
    async fn delete(&self, plugin_name: &str) -> Result<()>;
}

/// File-backed state store, one document per plugin under `state/`.
pub struct FileStateStore {
    store: JsonStore,
}

impl FileStateStore {
    pub fn new(base_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            store: JsonStore::new(base_dir),
        }
    }

    fn key(plugin_name: &str) -> String {
        format!("state/{plugin_name}.json")
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn read(&self, plugin_name: &str) -> Result<PluginState> {
        match self.store.read::<PluginState>(&Self::key(plugin_name)).await {
            Ok(mut state) => {
                // The document is keyed by plugin name; keep them in sync.
                state.plugin_name = plugin_name.to_string();
                Ok(state)
            },
            Err(StoreError::NotFound(_)) => {
                debug!(plugin = plugin_name, "no state on disk, creating");
                let state = PluginState::new(plugin_name);
                self.write(&state).await?;
                Ok(state)
            },
            Err(e) => Err(e),
        }
    }

    async fn write(&self, state: &PluginState) -> Result<()> {
        self.store.write(&Self::key(&state.plugin_name), state).await
    }

    async fn delete(&self, plugin_name: &str) -> Result<()> {
        self.store.delete(&Self::key(plugin_name)).await
    }
}
