//! Base-directory layout initialisation and runtime detection.

use {
    anyhow::{Context, Result, bail},
    tokio::{fs, process::Command},
    tracing::{debug, info, warn},
};

use runbox_runner::find_runtime;

use crate::service::PluginService;

const NODE_CORE_PACKAGE: &str = r#"{
  "name": "runbox-core",
  "version": "1.0.0",
  "private": true,
  "dependencies": {}
}
"#;

impl PluginService {
    /// Create the base layout, provision the managed runtimes, and record
    /// detected interpreter paths in the configuration.
    ///
    /// Runtime provisioning is best-effort: a machine without python3 or
    /// node still gets a usable layout, with the gaps logged.
    pub async fn init_layout(&self) -> Result<()> {
        for dir in ["plugins", "state", "core", "logs"] {
            fs::create_dir_all(self.base_dir().join(dir))
                .await
                .with_context(|| format!("failed to create {dir} directory"))?;
        }

        if let Err(e) = self.init_python_core().await {
            warn!(error = %e, "python core provisioning failed");
        }
        if let Err(e) = self.init_node_core().await {
            warn!(error = %e, "node core provisioning failed");
        }

        let mut config = self.config.read().await?;
        for (name, command) in config.supported_runtimes.clone() {
            match find_runtime(&command) {
                Some(path) => {
                    config.runtime_paths.insert(name, path.to_string_lossy().into_owned());
                },
                None => {
                    warn!(runtime = %name, command = %command, "interpreter not found on PATH");
                    config.runtime_paths.insert(name, "undefined".to_string());
                },
            }
        }
        self.config.write(&config).await?;

        info!(base = %self.base_dir().display(), "layout initialised");
        Ok(())
    }

    async fn init_python_core(&self) -> Result<()> {
        let py_core = self.base_dir().join("core").join("python");
        let venv = py_core.join("venv");
        if fs::try_exists(&venv).await.unwrap_or(false) {
            return Ok(());
        }

        info!("provisioning central python venv");
        fs::create_dir_all(&py_core).await?;
        let output = Command::new("python3")
            .args(["-m", "venv", "venv"])
            .current_dir(&py_core)
            .output()
            .await
            .context("failed to run python3")?;
        if !output.status.success() {
            bail!(
                "venv creation failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    async fn init_node_core(&self) -> Result<()> {
        let node_core = self.base_dir().join("core").join("node");
        let pkg = node_core.join("package.json");
        if fs::try_exists(&pkg).await.unwrap_or(false) {
            return Ok(());
        }

        debug!("initialising shared node cache");
        fs::create_dir_all(&node_core).await?;
        fs::write(&pkg, NODE_CORE_PACKAGE).await?;
        Ok(())
    }
}
