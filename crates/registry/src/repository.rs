//! Filesystem-backed plugin repository.

use std::{
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use {
    async_trait::async_trait,
    tokio::fs,
    tracing::{debug, info, warn},
    walkdir::WalkDir,
};

use crate::{
    error::{RegistryError, Result},
    manifest::{MANIFEST_FILE, PluginManifest},
    types::Plugin,
};

/// Storage and retrieval seam for installed plugins.
#[async_trait]
pub trait PluginRepository: Send + Sync {
    /// All installed plugins. Directories whose manifest cannot be read
    /// are skipped.
    async fn list(&self) -> Result<Vec<Plugin>>;
    /// A plugin by name, or [`RegistryError::NotFound`].
    async fn get(&self, name: &str) -> Result<Plugin>;
    async fn exists(&self, name: &str) -> bool;
    /// Install a plugin by copying a local source directory into the
    /// plugins directory.
    async fn add(&self, source: &Path) -> Result<Plugin>;
    /// Delete the plugin directory.
    async fn remove(&self, name: &str) -> Result<()>;
    /// Delete interpreter-specific dependency folders inside the plugin
    /// directory. The shared runtime caches are left alone.
    async fn remove_deps(&self, name: &str) -> Result<()>;
}

/// Repository rooted at `<base>/plugins`.
pub struct FsPluginRepository {
    plugins_dir: PathBuf,
}

impl FsPluginRepository {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            plugins_dir: base_dir.into().join("plugins"),
        }
    }

    fn plugin_dir(&self, name: &str) -> PathBuf {
        self.plugins_dir.join(name)
    }

    async fn read_plugin(&self, dir: &Path, name_hint: &str) -> Result<Plugin> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let content = match fs::read_to_string(&manifest_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RegistryError::NotFound(name_hint.to_string()));
            },
            Err(e) => return Err(e.into()),
        };
        let manifest = PluginManifest::parse(&content)?;
        Ok(Plugin {
            name: manifest.name,
            interpreter: manifest.interpreter,
            description: manifest.description,
            entry: manifest.entry,
            usage: manifest.usage,
            source: dir.to_path_buf(),
            added_at_ms: dir_mtime_ms(dir).await,
        })
    }
}

#[async_trait]
impl PluginRepository for FsPluginRepository {
    async fn list(&self) -> Result<Vec<Plugin>> {
        let mut entries = match fs::read_dir(&self.plugins_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut plugins = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            match self.read_plugin(&entry.path(), &name).await {
                Ok(plugin) => plugins.push(plugin),
                Err(e) => debug!(plugin = %name, error = %e, "skipping unreadable plugin"),
            }
        }
        Ok(plugins)
    }

    async fn get(&self, name: &str) -> Result<Plugin> {
        let dir = self.plugin_dir(name);
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            return Err(RegistryError::NotFound(name.to_string()));
        }
        self.read_plugin(&dir, name).await
    }

    async fn exists(&self, name: &str) -> bool {
        fs::try_exists(self.plugin_dir(name)).await.unwrap_or(false)
    }

    async fn add(&self, source: &Path) -> Result<Plugin> {
        let meta = fs::metadata(source)
            .await
            .map_err(|_| RegistryError::InvalidSource(source.to_path_buf()))?;
        if !meta.is_dir() {
            return Err(RegistryError::InvalidSource(source.to_path_buf()));
        }

        let content = fs::read_to_string(source.join(MANIFEST_FILE))
            .await
            .map_err(|_| RegistryError::InvalidSource(source.to_path_buf()))?;
        let manifest = PluginManifest::parse(&content)?;

        let target = self.plugin_dir(&manifest.name);
        if fs::try_exists(&target).await.unwrap_or(false) {
            return Err(RegistryError::AlreadyExists(manifest.name));
        }

        copy_dir(source, &target).await?;
        info!(plugin = %manifest.name, from = %source.display(), "plugin installed");

        Ok(Plugin {
            name: manifest.name,
            interpreter: manifest.interpreter,
            description: manifest.description,
            entry: manifest.entry,
            usage: manifest.usage,
            source: target.clone(),
            added_at_ms: dir_mtime_ms(&target).await,
        })
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let dir = self.plugin_dir(name);
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            return Err(RegistryError::NotFound(name.to_string()));
        }
        fs::remove_dir_all(&dir).await?;
        Ok(())
    }

    async fn remove_deps(&self, name: &str) -> Result<()> {
        let plugin = self.get(name).await?;
        let folders: &[&str] = match plugin.interpreter.as_str() {
            "python" => &["venv", ".venv", "__pycache__"],
            "node" | "javascript" | "typescript" => &["node_modules"],
            "r" => &["renv", ".Rproj.user"],
            _ => &[],
        };
        for folder in folders {
            let path = plugin.source.join(folder);
            if !fs::try_exists(&path).await.unwrap_or(false) {
                continue;
            }
            if let Err(e) = fs::remove_dir_all(&path).await {
                warn!(plugin = name, path = %path.display(), error = %e, "failed to remove dependency folder");
            }
        }
        Ok(())
    }
}

async fn dir_mtime_ms(dir: &Path) -> u64 {
    match fs::metadata(dir).await {
        Ok(meta) => meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default(),
        Err(_) => 0,
    }
}

/// Recursive copy, preserving the directory shape; symlinks are skipped.
async fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    let src = src.to_path_buf();
    let dst = dst.to_path_buf();
    tokio::task::spawn_blocking(move || copy_dir_blocking(&src, &dst))
        .await
        .map_err(std::io::Error::other)??;
    Ok(())
}

fn copy_dir_blocking(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(std::io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(std::io::Error::other)?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_MANIFEST: &str =
        "name: hello\ninterpreter: python\ndescription: test plugin\nentry: hello.py\n";

    fn seed_source(dir: &Path) {
        std::fs::create_dir_all(dir.join("lib")).unwrap();
        std::fs::write(dir.join(MANIFEST_FILE), HELLO_MANIFEST).unwrap();
        std::fs::write(dir.join("hello.py"), "print('hi')\n").unwrap();
        std::fs::write(dir.join("lib").join("util.py"), "\n").unwrap();
    }

    #[tokio::test]
    async fn add_copies_the_source_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("src");
        seed_source(&source);

        let repo = FsPluginRepository::new(tmp.path().join("base"));
        let plugin = repo.add(&source).await.unwrap();
        assert_eq!(plugin.name, "hello");
        assert!(plugin.source.join("hello.py").is_file());
        assert!(plugin.source.join("lib").join("util.py").is_file());
        assert!(repo.exists("hello").await);
    }

    #[tokio::test]
    async fn add_rejects_duplicates_and_bad_sources() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("src");
        seed_source(&source);

        let repo = FsPluginRepository::new(tmp.path().join("base"));
        repo.add(&source).await.unwrap();
        let err = repo.add(&source).await.unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists(_)));

        let err = repo.add(&tmp.path().join("nowhere")).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidSource(_)));
    }

    #[tokio::test]
    async fn get_and_list_read_manifests() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("src");
        seed_source(&source);

        let repo = FsPluginRepository::new(tmp.path().join("base"));
        repo.add(&source).await.unwrap();

        let plugin = repo.get("hello").await.unwrap();
        assert_eq!(plugin.interpreter, "python");
        assert_eq!(plugin.entry, "hello.py");

        let plugins = repo.list().await.unwrap();
        assert_eq!(plugins.len(), 1);

        let err = repo.get("ghost").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_skips_directories_without_manifests() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("base");
        std::fs::create_dir_all(base.join("plugins").join("broken")).unwrap();

        let repo = FsPluginRepository::new(&base);
        assert!(repo.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_deletes_the_plugin_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("src");
        seed_source(&source);

        let repo = FsPluginRepository::new(tmp.path().join("base"));
        repo.add(&source).await.unwrap();
        repo.remove("hello").await.unwrap();
        assert!(!repo.exists("hello").await);
        assert!(matches!(repo.remove("hello").await.unwrap_err(), RegistryError::NotFound(_)));
    }

    #[tokio::test]
    async fn remove_deps_clears_local_folders_only() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("src");
        seed_source(&source);

        let repo = FsPluginRepository::new(tmp.path().join("base"));
        let plugin = repo.add(&source).await.unwrap();
        std::fs::create_dir_all(plugin.source.join("__pycache__")).unwrap();

        repo.remove_deps("hello").await.unwrap();
        assert!(!plugin.source.join("__pycache__").exists());
        assert!(plugin.source.join("hello.py").is_file());
    }
}
