//! Atomic read/write of keyed JSON documents.
//!
//! Writes go to `<path>.tmp`, get synced, then renamed over the final
//! path. Any failure along the way removes the temp artifact and leaves
//! the previously committed file untouched, so writes are all-or-nothing
//! from a reader's perspective.

use std::path::{Path, PathBuf};

use {
    serde::{Serialize, de::DeserializeOwned},
    tokio::{fs, io::AsyncWriteExt},
    tracing::debug,
};

use crate::error::{Result, StoreError};

/// JSON document store keyed by path relative to a base directory.
#[derive(Debug, Clone)]
pub struct JsonStore {
    base_dir: PathBuf,
}

impl JsonStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Absolute path of the document stored under `key`.
    pub fn path(&self, key: &str) -> PathBuf {
        self.base_dir.join(key)
    }

    /// Read and decode the document at `key`.
    ///
    /// A missing file is [`StoreError::NotFound`], an empty file is
    /// [`StoreError::Empty`], undecodable content is [`StoreError::Json`].
    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let path = self.path(key);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(path));
            },
            Err(e) => return Err(e.into()),
        };
        if data.is_empty() {
            return Err(StoreError::Empty(path));
        }
        Ok(serde_json::from_slice(&data)?)
    }

    /// Atomically write `value` as pretty-printed JSON under `key`.
    pub async fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(value)?;

        let tmp = tmp_path(&path);
        if let Err(e) = write_synced(&tmp, &json).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(path = %path.display(), bytes = json.len(), "wrote document");
        Ok(())
    }

    pub async fn exists(&self, key: &str) -> bool {
        fs::try_exists(self.path(key)).await.unwrap_or(false)
    }

    /// Remove the document stored under `key`.
    pub async fn delete(&self, key: &str) -> Result<()> {
        Ok(fs::remove_file(self.path(key)).await?)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

async fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Doc {
        value: u32,
    }

    fn store() -> (tempfile::TempDir, JsonStore) {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = JsonStore::new(tmp.path());
        (tmp, store)
    }

    #[tokio::test]
    async fn write_then_read_roundtrips() {
        let (_tmp, store) = store();
        store.write("nested/doc.json", &Doc { value: 7 }).await.expect("write");
        let doc: Doc = store.read("nested/doc.json").await.expect("read");
        assert_eq!(doc, Doc { value: 7 });
    }

    #[tokio::test]
    async fn missing_document_is_not_found() {
        let (_tmp, store) = store();
        let err = store.read::<Doc>("absent.json").await.expect_err("should miss");
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn empty_document_is_an_explicit_error() {
        let (_tmp, store) = store();
        std::fs::write(store.path("empty.json"), b"").expect("seed");
        let err = store.read::<Doc>("empty.json").await.expect_err("should reject");
        assert!(matches!(err, StoreError::Empty(_)));
    }

    #[tokio::test]
    async fn malformed_document_is_a_decode_error() {
        let (_tmp, store) = store();
        std::fs::write(store.path("bad.json"), b"{not json").expect("seed");
        let err = store.read::<Doc>("bad.json").await.expect_err("should reject");
        assert!(matches!(err, StoreError::Json(_)));
    }

    #[tokio::test]
    async fn failed_write_leaves_committed_document_untouched() {
        let (_tmp, store) = store();
        store.write("doc.json", &Doc { value: 1 }).await.expect("first write");
        let committed = std::fs::read(store.path("doc.json")).expect("committed bytes");

        // Occupy the temp path with a non-empty directory so the write
        // fails before it can reach the rename step.
        let tmp = store.path("doc.json.tmp");
        std::fs::create_dir_all(tmp.join("blocker")).expect("block tmp path");

        let err = store.write("doc.json", &Doc { value: 2 }).await;
        assert!(err.is_err());

        let after = std::fs::read(store.path("doc.json")).expect("still readable");
        assert_eq!(committed, after);
        let doc: Doc = store.read("doc.json").await.expect("still decodes");
        assert_eq!(doc, Doc { value: 1 });
    }

    #[tokio::test]
    async fn delete_removes_the_document() {
        let (_tmp, store) = store();
        store.write("doc.json", &Doc { value: 1 }).await.expect("write");
        store.delete("doc.json").await.expect("delete");
        assert!(!store.exists("doc.json").await);
    }
}
