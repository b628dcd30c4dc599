//! Global usage statistics: recency- and frequency-ranked plugin lists.

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

/// Default capacity of the recency list.
pub const DEFAULT_MAX_RECENT: usize = 20;
/// Default capacity of the frequency list.
pub const DEFAULT_MAX_MOST_USED: usize = 10;

/// One plugin's presence in a ranked usage list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageEntry {
    pub plugin_name: String,
    pub timestamp_ms: u64,
    pub run_count: u64,
}

/// Global usage rankings.
///
/// `recently_used` is sorted by timestamp descending, `most_used` by run
/// count descending with ties keeping their prior relative order. Each
/// plugin name appears at most once per list. Capacities are fixed when
/// the document is first created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    #[serde(default)]
    pub recently_used: Vec<UsageEntry>,
    #[serde(default)]
    pub most_used: Vec<UsageEntry>,
    #[serde(default = "default_max_recent")]
    pub max_recent: usize,
    #[serde(default = "default_max_most_used")]
    pub max_most_used: usize,
}

fn default_max_recent() -> usize {
    DEFAULT_MAX_RECENT
}

fn default_max_most_used() -> usize {
    DEFAULT_MAX_MOST_USED
}

impl Default for UsageStats {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECENT, DEFAULT_MAX_MOST_USED)
    }
}

impl UsageStats {
    pub fn new(max_recent: usize, max_most_used: usize) -> Self {
        Self {
            recently_used: Vec::new(),
            most_used: Vec::new(),
            max_recent,
            max_most_used,
        }
    }

    /// Record one run of `plugin_name` in both rankings.
    pub fn record_run(&mut self, plugin_name: &str) {
        let now = now_ms();

        // Move the entry to the front before the re-sort so that another
        // entry sharing the same millisecond cannot stay ranked above it.
        let run_count = match self.recently_used.iter().position(|e| e.plugin_name == plugin_name)
        {
            Some(pos) => self.recently_used.remove(pos).run_count + 1,
            None => 1,
        };
        self.recently_used.insert(0, UsageEntry {
            plugin_name: plugin_name.to_string(),
            timestamp_ms: now,
            run_count,
        });
        self.recently_used.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
        self.recently_used.truncate(self.max_recent);

        match self.most_used.iter_mut().find(|e| e.plugin_name == plugin_name) {
            Some(entry) => entry.run_count += 1,
            None => self.most_used.push(UsageEntry {
                plugin_name: plugin_name.to_string(),
                timestamp_ms: now,
                run_count: 1,
            }),
        }
        // sort_by is stable: equal run counts keep their relative order.
        self.most_used.sort_by(|a, b| b.run_count.cmp(&a.run_count));
        self.most_used.truncate(self.max_most_used);
    }

    /// Drop `plugin_name` from both rankings. Returns whether anything
    /// was removed.
    pub fn remove_plugin(&mut self, plugin_name: &str) -> bool {
        let before = self.recently_used.len() + self.most_used.len();
        self.recently_used.retain(|e| e.plugin_name != plugin_name);
        self.most_used.retain(|e| e.plugin_name != plugin_name);
        before != self.recently_used.len() + self.most_used.len()
    }
}

/// Persistence seam for the usage singleton.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Read the stats, creating and persisting a fresh document if none
    /// exists yet.
    async fn read(&self) -> Result<UsageStats>;
    async fn write(&self, stats: &UsageStats) -> Result<()>;
}

const USAGE_KEY: &str = "usage.json";

/// File-backed usage store over the `usage.json` singleton.
pub struct FileUsageStore {
    store: JsonStore,
    max_recent: usize,
    max_most_used: usize,
}

impl FileUsageStore {
    pub fn new(base_dir: impl Into<std::path::PathBuf>) -> Self {
        Self::with_limits(base_dir, DEFAULT_MAX_RECENT, DEFAULT_MAX_MOST_USED)
    }

    /// Capacities applied when the document is first created.
    pub fn with_limits(
        base_dir: impl Into<std::path::PathBuf>,
        max_recent: usize,
        max_most_used: usize,
    ) -> Self {
        Self {
            store: JsonStore::new(base_dir),
            max_recent,
            max_most_used,
        }
    }
}

#[async_trait]
impl UsageStore for FileUsageStore {
    async fn read(&self) -> Result<UsageStats> {
        match self.store.read(USAGE_KEY).await {
            Ok(stats) => Ok(stats),
            Err(StoreError::NotFound(_)) => {
                debug!("no usage stats on disk, creating");
                let stats = UsageStats::new(self.max_recent, self.max_most_used);
                self.write(&stats).await?;
                Ok(stats)
            },
            Err(e) => Err(e),
        }
    }

    async fn write(&self, stats: &UsageStats) -> Result<()> {
        self.store.write(USAGE_KEY, stats).await
    }
}
