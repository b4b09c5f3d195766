//! Object Store Abstraction
//!
//! Provides a uniform, key-addressed contract over a remote object store
//! (prefix listing, per-object timestamps, file transfer, delete, copy).
//!
//! Implementations exist for Swift-compatible HTTP stores
//! (`provider-swift`) and plain directory trees (`provider-localdir`).
//!
//! # Consistency contract
//!
//! The store is one of the two shared media the relay pipelines synchronize
//! through; there is no locking anywhere. Every operation here must be safe
//! to repeat: `upload` overwrites, `delete` of a missing object succeeds,
//! and `move_object` is explicitly non-atomic (see its docs). Callers are
//! expected to converge through idempotent re-processing, never by assuming
//! an operation is all-or-nothing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

use crate::error::Result;

/// Key-addressed object store operations
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every object key under the given prefix.
    ///
    /// Implementations must paginate internally; the returned set is never
    /// truncated at a provider page limit. Keys are returned in ascending
    /// lexicographic order, but callers must not rely on order for
    /// correctness.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Last-modified timestamp of an object, or `None` if it does not exist.
    ///
    /// A missing object is a normal outcome, not an error.
    async fn last_modified(&self, key: &str) -> Result<Option<DateTime<Utc>>>;

    /// Download an object into a local file, creating parent directories.
    async fn download(&self, key: &str, local_path: &Path) -> Result<()>;

    /// Upload a local file to an object key, overwriting any existing object.
    async fn upload(&self, local_path: &Path, key: &str) -> Result<()>;

    /// Delete an object. Deleting a missing object succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Server-side copy of an object to another key.
    async fn copy(&self, src_key: &str, dst_key: &str) -> Result<()>;

    /// Move an object by copying it to `dst_key` and deleting `src_key`.
    ///
    /// This is NOT atomic: a crash between the two phases leaves the object
    /// at both locations, and a brief window exists where a concurrent
    /// lister sees it at both. Callers must treat the postcondition as
    /// "at least one of src/dst exists" and re-derive state from scans.
    ///
    /// The copy phase is skipped when `dst_key` already exists, so a move
    /// retried after a crash neither clobbers the destination nor fails on
    /// the already-deleted source.
    async fn move_object(&self, src_key: &str, dst_key: &str) -> Result<()> {
        if src_key == dst_key {
            return Ok(());
        }
        if self.last_modified(dst_key).await?.is_none() {
            self.copy(src_key, dst_key).await?;
        }
        self.delete(src_key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Minimal in-memory store tracking copy/delete calls, enough to
    /// exercise the provided `move_object` behavior.
    #[derive(Default)]
    struct MapStore {
        objects: Mutex<BTreeMap<String, DateTime<Utc>>>,
        copies: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ObjectStore for MapStore {
        async fn list(&self, prefix: &str) -> Result<Vec<String>> {
            Ok(self
                .objects
                .lock()
                .unwrap()
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        }

        async fn last_modified(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
            Ok(self.objects.lock().unwrap().get(key).copied())
        }

        async fn download(&self, key: &str, _local_path: &Path) -> Result<()> {
            if self.objects.lock().unwrap().contains_key(key) {
                Ok(())
            } else {
                Err(StoreError::NotFound(key.to_string()))
            }
        }

        async fn upload(&self, _local_path: &Path, key: &str) -> Result<()> {
            self.objects
                .lock()
                .unwrap()
                .insert(key.to_string(), Utc::now());
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.objects.lock().unwrap().remove(key);
            Ok(())
        }

        async fn copy(&self, src_key: &str, dst_key: &str) -> Result<()> {
            let mut objects = self.objects.lock().unwrap();
            let ts = *objects
                .get(src_key)
                .ok_or_else(|| StoreError::NotFound(src_key.to_string()))?;
            objects.insert(dst_key.to_string(), ts);
            self.copies
                .lock()
                .unwrap()
                .push((src_key.to_string(), dst_key.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_move_copies_then_deletes() {
        let store = MapStore::default();
        store.upload(Path::new("x"), "a/src.json").await.unwrap();

        store.move_object("a/src.json", "b/dst.json").await.unwrap();

        assert!(store.last_modified("a/src.json").await.unwrap().is_none());
        assert!(store.last_modified("b/dst.json").await.unwrap().is_some());
        assert_eq!(store.copies.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_move_skips_copy_when_dst_exists() {
        let store = MapStore::default();
        store.upload(Path::new("x"), "a/src.json").await.unwrap();
        store.upload(Path::new("x"), "b/dst.json").await.unwrap();

        store.move_object("a/src.json", "b/dst.json").await.unwrap();

        assert!(store.last_modified("a/src.json").await.unwrap().is_none());
        assert!(store.copies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_move_to_same_key_is_noop() {
        let store = MapStore::default();
        store.upload(Path::new("x"), "a/src.json").await.unwrap();

        store.move_object("a/src.json", "a/src.json").await.unwrap();

        assert!(store.last_modified("a/src.json").await.unwrap().is_some());
    }
}
