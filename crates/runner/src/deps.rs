//! Dependency provisioning for installed plugins.
//!
//! Python dependencies install into the centrally managed venv, node
//! dependencies into the shared `core/node` cache; plugins never keep
//! their own copies.

use std::{collections::BTreeMap, path::PathBuf};

use {
    anyhow::{Context, Result, bail},
    async_trait::async_trait,
    serde::Deserialize,
    tokio::{fs, process::Command},
    tracing::{debug, info, warn},
};

use runbox_registry::Plugin;

/// Provisioning seam, invoked around — not during — plugin execution.
#[async_trait]
pub trait DependencyInstaller: Send + Sync {
    async fn install(&self, plugin: &Plugin) -> Result<()>;
    async fn uninstall(&self, plugin: &Plugin) -> Result<()>;
}

/// Installer working against the managed runtime layout.
pub struct FsInstaller {
    base_dir: PathBuf,
}

impl FsInstaller {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    async fn install_python(&self, plugin: &Plugin) -> Result<()> {
        let requirements = plugin.source.join("requirements.txt");
        if !fs::try_exists(&requirements).await.unwrap_or(false) {
            debug!(plugin = %plugin.name, "no requirements.txt, nothing to install");
            return Ok(());
        }

        let pip = self
            .base_dir
            .join("core")
            .join("python")
            .join("venv")
            .join("bin")
            .join("pip");
        let output = Command::new(&pip)
            .args(["install", "-r", "requirements.txt"])
            .current_dir(&plugin.source)
            .output()
            .await
            .with_context(|| format!("failed to run {}", pip.display()))?;
        if !output.status.success() {
            bail!(
                "pip install failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        info!(plugin = %plugin.name, "python dependencies installed");
        Ok(())
    }

    async fn install_node(&self, plugin: &Plugin) -> Result<()> {
        let pkg_path = plugin.source.join("package.json");
        let data = match fs::read_to_string(&pkg_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(plugin = %plugin.name, "no package.json, nothing to install");
                return Ok(());
            },
            Err(e) => return Err(e).context("failed to read package.json"),
        };

        #[derive(Deserialize, Default)]
        struct PkgJson {
            #[serde(default)]
            dependencies: BTreeMap<String, String>,
        }
        let pkg: PkgJson = serde_json::from_str(&data).context("failed to parse package.json")?;
        if pkg.dependencies.is_empty() {
            return Ok(());
        }

        let node_core = self.base_dir.join("core").join("node");
        fs::create_dir_all(&node_core)
            .await
            .context("failed to create shared node cache")?;

        let mut args = vec!["install".to_string()];
        args.extend(
            pkg.dependencies
                .iter()
                .map(|(name, version)| format!("{name}@{version}")),
        );
        let output = Command::new("npm")
            .args(&args)
            .current_dir(&node_core)
            .output()
            .await
            .context("failed to run npm")?;
        if !output.status.success() {
            bail!(
                "npm install failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        // The shared cache supersedes any plugin-local install.
        let local = plugin.source.join("node_modules");
        if fs::try_exists(&local).await.unwrap_or(false) {
            let _ = fs::remove_dir_all(&local).await;
        }
        info!(plugin = %plugin.name, "node dependencies installed");
        Ok(())
    }
}

#[async_trait]
impl DependencyInstaller for FsInstaller {
    async fn install(&self, plugin: &Plugin) -> Result<()> {
        match plugin.interpreter.as_str() {
            "python" => self.install_python(plugin).await,
            "node" | "javascript" | "typescript" => self.install_node(plugin).await,
            other => bail!("no dependency install strategy for interpreter: {other}"),
        }
    }

    async fn uninstall(&self, plugin: &Plugin) -> Result<()> {
        match plugin.interpreter.as_str() {
            // Shared caches stay; only plugin-local artifacts go.
            "node" | "javascript" | "typescript" => {
                let local = plugin.source.join("node_modules");
                if let Err(e) = fs::remove_dir_all(&local).await
                    && e.kind() != std::io::ErrorKind::NotFound
                {
                    warn!(plugin = %plugin.name, error = %e, "failed to remove node_modules");
                }
                Ok(())
            },
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn plugin(source: &Path, interpreter: &str) -> Plugin {
        std::fs::create_dir_all(source).unwrap();
        Plugin {
            name: "hello".to_string(),
            interpreter: interpreter.to_string(),
            description: String::new(),
            entry: "hello.py".to_string(),
            usage: String::new(),
            source: source.to_path_buf(),
            added_at_ms: 0,
        }
    }

    #[tokio::test]
    async fn python_without_requirements_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let installer = FsInstaller::new(tmp.path());
        let plugin = plugin(&tmp.path().join("plugins").join("hello"), "python");
        installer.install(&plugin).await.unwrap();
    }

    #[tokio::test]
    async fn node_without_dependencies_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let installer = FsInstaller::new(tmp.path());
        let plugin = plugin(&tmp.path().join("plugins").join("hello"), "node");
        std::fs::write(
            plugin.source.join("package.json"),
            r#"{"name": "hello", "dependencies": {}}"#,
        )
        .unwrap();
        installer.install(&plugin).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_interpreter_has_no_install_strategy() {
        let tmp = tempfile::tempdir().unwrap();
        let installer = FsInstaller::new(tmp.path());
        let plugin = plugin(&tmp.path().join("plugins").join("hello"), "r");
        assert!(installer.install(&plugin).await.is_err());
        // Uninstall for the same interpreter is a harmless no-op.
        installer.uninstall(&plugin).await.unwrap();
    }

    #[tokio::test]
    async fn uninstall_removes_local_node_modules() {
        let tmp = tempfile::tempdir().unwrap();
        let installer = FsInstaller::new(tmp.path());
        let plugin = plugin(&tmp.path().join("plugins").join("hello"), "node");
        std::fs::create_dir_all(plugin.source.join("node_modules").join("left-pad")).unwrap();
        installer.uninstall(&plugin).await.unwrap();
        assert!(!plugin.source.join("node_modules").exists());
    }
}
