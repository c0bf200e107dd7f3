//! Local filesystem storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::ObjectStore;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Local filesystem object store.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Get the full path for a key, with path traversal protection.
    fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }
        // Every component must be a plain name (no '.', '..', roots).
        for component in Path::new(key).components() {
            match component {
                std::path::Component::Normal(_) => {}
                _ => {
                    return Err(StorageError::InvalidKey(format!(
                        "contains unsafe path component: {key}"
                    )));
                }
            }
        }
        Ok(self.root.join(key))
    }

    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Walk the tree under root, collecting keys that start with `prefix`.
    async fn walk_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::Io(e)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(path);
                } else if file_type.is_file() {
                    if let Ok(rel) = path.strip_prefix(&self.root) {
                        let key = rel
                            .components()
                            .filter_map(|c| c.as_os_str().to_str())
                            .collect::<Vec<_>>()
                            .join("/");
                        // Skip in-flight temp files from interrupted writes.
                        if key.starts_with(prefix) && !key.ends_with(".tmp") {
                            keys.push(key);
                        }
                    }
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key)?;
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.key_path(key)?;
        self.ensure_parent(&path).await?;

        // Write to a temp file then rename for atomicity.
        let tmp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4()));
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(e));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete_prefix(&self, prefix: &str) -> StorageResult<u64> {
        let keys = self.walk_keys(prefix).await?;
        let mut deleted = 0u64;
        for key in keys {
            self.delete(&key).await?;
            deleted += 1;
        }
        Ok(deleted)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.walk_keys(prefix).await
    }

    async fn presign_get(&self, _key: &str, _expires_in: Duration) -> StorageResult<String> {
        Err(StorageError::PresignUnsupported)
    }

    fn permanent_url(&self, _key: &str) -> Option<String> {
        None
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn backend() -> (tempfile::TempDir, FilesystemBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path().join("store")).await.unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn test_put_get_delete_roundtrip() {
        let (_dir, backend) = backend().await;
        backend
            .put("users/a/images/1.jpg", Bytes::from_static(b"jpeg"))
            .await
            .unwrap();
        assert!(backend.exists("users/a/images/1.jpg").await.unwrap());
        assert_eq!(
            backend.get("users/a/images/1.jpg").await.unwrap(),
            Bytes::from_static(b"jpeg")
        );

        backend.delete("users/a/images/1.jpg").await.unwrap();
        assert!(!backend.exists("users/a/images/1.jpg").await.unwrap());
        // Deleting again is fine.
        backend.delete("users/a/images/1.jpg").await.unwrap();
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (_dir, backend) = backend().await;
        assert!(matches!(
            backend.get("missing.bin").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let (_dir, backend) = backend().await;
        for key in ["../escape", "/abs", "a/../../b"] {
            assert!(matches!(
                backend.get(key).await,
                Err(StorageError::InvalidKey(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_list_and_delete_prefix() {
        let (_dir, backend) = backend().await;
        backend.put("models/m1/weights.bin", Bytes::from_static(b"w")).await.unwrap();
        backend.put("models/m1/config.json", Bytes::from_static(b"{}")).await.unwrap();
        backend.put("models/m2/weights.bin", Bytes::from_static(b"w")).await.unwrap();

        let keys = backend.list("models/m1/").await.unwrap();
        assert_eq!(keys, vec!["models/m1/config.json", "models/m1/weights.bin"]);

        assert_eq!(backend.delete_prefix("models/m1/").await.unwrap(), 2);
        assert!(backend.list("models/m1/").await.unwrap().is_empty());
        assert!(backend.exists("models/m2/weights.bin").await.unwrap());
    }

    #[tokio::test]
    async fn test_presign_unsupported() {
        let (_dir, backend) = backend().await;
        assert!(matches!(
            backend.presign_get("k", Duration::from_secs(60)).await,
            Err(StorageError::PresignUnsupported)
        ));
        assert!(backend.permanent_url("k").is_none());
    }
}
