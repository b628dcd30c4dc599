//! The closed set of supported interpreters and command resolution.

use std::path::{Path, PathBuf};

use runbox_registry::Plugin;

use crate::error::{Result, RunnerError};

/// Supported interpreter kinds.
///
/// Adding an interpreter means adding a variant here and a
/// [`resolve_command`] arm; nothing downstream changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpreter {
    Python,
    Node,
    R,
}

impl Interpreter {
    /// Parse a raw manifest interpreter string.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "python" => Ok(Self::Python),
            "node" | "javascript" | "typescript" => Ok(Self::Node),
            "r" => Ok(Self::R),
            other => Err(RunnerError::UnsupportedInterpreter(other.to_string())),
        }
    }

    /// Display label of the resolved runtime.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Python => "python3",
            Self::Node => "node",
            Self::R => "Rscript",
        }
    }
}

/// A fully resolved subprocess invocation.
#[derive(Debug, Clone)]
pub struct ResolvedCommand {
    pub program: PathBuf,
    /// Leading arguments (the entry file), before the user's own.
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

/// Resolve the executable command for `plugin` against the managed
/// runtime layout under `base_dir`.
///
/// Python runs under the central venv interpreter, the node family under
/// the system `node` with `NODE_PATH` pointed at the shared dependency
/// cache, and `r` under `Rscript`.
pub fn resolve_command(plugin: &Plugin, base_dir: &Path) -> Result<ResolvedCommand> {
    let interpreter = Interpreter::parse(&plugin.interpreter)?;
    let entry = plugin.source.join(&plugin.entry).to_string_lossy().into_owned();

    let resolved = match interpreter {
        Interpreter::Python => ResolvedCommand {
            program: base_dir
                .join("core")
                .join("python")
                .join("venv")
                .join("bin")
                .join("python3"),
            args: vec![entry],
            env: Vec::new(),
        },
        Interpreter::Node => ResolvedCommand {
            program: PathBuf::from("node"),
            args: vec![entry],
            env: vec![(
                "NODE_PATH".to_string(),
                base_dir
                    .join("core")
                    .join("node")
                    .join("node_modules")
                    .to_string_lossy()
                    .into_owned(),
            )],
        },
        Interpreter::R => ResolvedCommand {
            program: PathBuf::from("Rscript"),
            args: vec![entry],
            env: Vec::new(),
        },
    };
    Ok(resolved)
}

/// Look up a runtime command on PATH.
pub fn find_runtime(command: &str) -> Option<PathBuf> {
    which::which(command).ok()
}
