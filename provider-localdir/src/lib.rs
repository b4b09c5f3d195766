//! # Local Directory Store Provider
//!
//! Implements [`ObjectStore`] over a plain directory tree.
//!
//! ## Overview
//!
//! Object key `a/b/c.json` maps to `<root>/a/b/c.json`. This provider backs
//! two deployments:
//!
//! - integration tests and local development, keeping the engine hermetic
//!   (no HTTP endpoint required)
//! - installations where the bucket is exposed as a mounted share
//!
//! `copy` is a filesystem copy, so `move_object`'s two-phase contract and
//! its non-atomicity are identical to the remote providers'.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_traits::error::{Result, StoreError};
use relay_traits::store::ObjectStore;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Directory-tree-backed object store
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute path for an object key
    fn key_path(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in key.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    fn not_found(e: std::io::Error, key: &str) -> StoreError {
        if e.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(key.to_string())
        } else {
            StoreError::Io(e)
        }
    }
}

#[async_trait]
impl ObjectStore for LocalDirStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut stack = vec![self.root.clone()];

        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                // Root (or an intermediate dir) not created yet: empty listing
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    stack.push(path);
                    continue;
                }
                let rel = path
                    .strip_prefix(&self.root)
                    .expect("walked path is under root");
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn last_modified(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        match fs::metadata(self.key_path(key)).await {
            Ok(metadata) => {
                let modified = metadata.modified()?;
                Ok(Some(modified.into()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn download(&self, key: &str, local_path: &Path) -> Result<()> {
        Self::ensure_parent(local_path).await?;
        fs::copy(self.key_path(key), local_path)
            .await
            .map_err(|e| Self::not_found(e, key))?;
        debug!(key, path = %local_path.display(), "store -> local");
        Ok(())
    }

    async fn upload(&self, local_path: &Path, key: &str) -> Result<()> {
        let dst = self.key_path(key);
        Self::ensure_parent(&dst).await?;
        fs::copy(local_path, &dst).await?;
        debug!(key, path = %local_path.display(), "local -> store");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.key_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn copy(&self, src_key: &str, dst_key: &str) -> Result<()> {
        let dst = self.key_path(dst_key);
        Self::ensure_parent(&dst).await?;
        fs::copy(self.key_path(src_key), &dst)
            .await
            .map_err(|e| Self::not_found(e, src_key))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn put(store: &LocalDirStore, key: &str, content: &str) {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        fs::write(&src, content).await.unwrap();
        store.upload(&src, key).await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_download_round_trip() {
        let remote = tempdir().unwrap();
        let local = tempdir().unwrap();
        let store = LocalDirStore::new(remote.path());

        put(&store, "iconml/request/abc.json", "{\"hash\":\"abc\"}").await;

        let dst = local.path().join("abc.json");
        store.download("iconml/request/abc.json", &dst).await.unwrap();
        assert_eq!(
            fs::read_to_string(&dst).await.unwrap(),
            "{\"hash\":\"abc\"}"
        );
    }

    #[tokio::test]
    async fn test_list_filters_by_prefix_and_sorts() {
        let remote = tempdir().unwrap();
        let store = LocalDirStore::new(remote.path());

        put(&store, "iconml/request/b.json", "b").await;
        put(&store, "iconml/request/a.json", "a").await;
        put(&store, "iconml/images/icon.png", "png").await;

        let keys = store.list("iconml/request/").await.unwrap();
        assert_eq!(
            keys,
            vec![
                "iconml/request/a.json".to_string(),
                "iconml/request/b.json".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_repeated_upload_is_idempotent() {
        let remote = tempdir().unwrap();
        let store = LocalDirStore::new(remote.path());

        // A crash-restart re-delivery overwrites with the same content and
        // leaves the store in the same final state
        put(&store, "iconml/inforesults/a.json", "{\"ok\":true}").await;
        put(&store, "iconml/inforesults/a.json", "{\"ok\":true}").await;

        let keys = store.list("iconml/inforesults/").await.unwrap();
        assert_eq!(keys, vec!["iconml/inforesults/a.json".to_string()]);

        let local = tempdir().unwrap();
        let dst = local.path().join("a.json");
        store.download("iconml/inforesults/a.json", &dst).await.unwrap();
        assert_eq!(fs::read_to_string(&dst).await.unwrap(), "{\"ok\":true}");
    }

    #[tokio::test]
    async fn test_list_missing_root_is_empty() {
        let remote = tempdir().unwrap();
        let store = LocalDirStore::new(remote.path().join("never-created"));
        assert!(store.list("iconml/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_last_modified_missing_is_none() {
        let remote = tempdir().unwrap();
        let store = LocalDirStore::new(remote.path());
        assert!(store.last_modified("nope.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let remote = tempdir().unwrap();
        let store = LocalDirStore::new(remote.path());
        store.delete("nope.json").await.unwrap();
    }

    #[tokio::test]
    async fn test_move_object() {
        let remote = tempdir().unwrap();
        let store = LocalDirStore::new(remote.path());
        put(&store, "iconml/request/x.json", "x").await;

        store
            .move_object("iconml/request/x.json", "iconml/processing/x.json")
            .await
            .unwrap();

        assert!(store
            .last_modified("iconml/request/x.json")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .last_modified("iconml/processing/x.json")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_download_missing_is_not_found() {
        let remote = tempdir().unwrap();
        let local = tempdir().unwrap();
        let store = LocalDirStore::new(remote.path());

        let err = store
            .download("gone.json", &local.path().join("gone.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
