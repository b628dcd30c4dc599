//! Persistence for runbox: atomic JSON documents, per-plugin run state,
//! global usage statistics, and configuration.
//!
//! All documents live under one base directory and are written through the
//! temp-then-rename contract in [`json_store`], so a reader never observes
//! a partial write.

pub mod config;
pub mod error;
pub mod json_store;
pub mod state;
pub mod usage;

pub use config::{Config, ConfigStore, FileConfigStore, TopListOrder};
pub use error::{Result, StoreError};
pub use json_store::JsonStore;
pub use state::{DEFAULT_MAX_HISTORY, FileStateStore, PluginState, RunRecord, RunStatus, StateStore};
pub use usage::{FileUsageStore, UsageEntry, UsageStats, UsageStore};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as epoch milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
