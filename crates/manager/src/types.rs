//! Caller-facing result types for the management service.

use serde::Serialize;

use {runbox_registry::Plugin, runbox_store::RunRecord};

/// Outcome of one orchestrated plugin run.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunPluginResult {
    pub plugin_name: String,
    pub args: String,
    /// True when the process ran and exited with code 0.
    pub success: bool,
    pub message: String,
    pub exit_code: i32,
    pub duration_ms: u64,
    pub status: String,
    /// Display label of the resolved runtime.
    pub interpreter: String,
    pub output: String,
}

/// Detailed plugin view: metadata, state summary, recent history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    pub plugin: Plugin,
    pub last_executed_at_ms: u64,
    pub run_count: u64,
    pub most_recent_args: Option<String>,
    /// Newest first, bounded by the requested limit.
    pub recent_history: Vec<RunRecord>,
}

/// One row in a dashboard list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginListItem {
    pub name: String,
    pub interpreter: String,
    pub description: String,
    pub usage: String,
    pub last_run_ms: u64,
    pub run_count: u64,
}

/// Dashboard listing: a ranked top list plus the alphabetical main list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub top: Vec<PluginListItem>,
    pub main: Vec<PluginListItem>,
    pub total_count: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub show_top_list: bool,
}
