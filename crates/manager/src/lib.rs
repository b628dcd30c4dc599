//! Management service: run orchestration and plugin administration over
//! the registry, the state/usage/config stores, the execution engine, and
//! the dependency installer.

pub mod init;
pub mod run;
pub mod service;
pub mod types;

pub use run::RunPluginError;
pub use service::PluginService;
pub use types::{Dashboard, PluginInfo, PluginListItem, RunPluginResult};
