//! Local filesystem helpers shared by the pipelines

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::error::Result;

/// List regular files in a flat directory whose name ends with `suffix`.
///
/// A missing directory yields an empty listing; role directories are created
/// lazily and the worker may not have produced anything yet.
pub async fn list_files_with_suffix(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.ends_with(suffix) {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Final path segment of an object key
pub fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Filename without its last extension
pub fn stem_of(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

/// Filename of a path as an owned string, `None` for non-UTF-8 names
pub fn file_name_string(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(String::from)
}

/// Existence check that treats probe errors as absence
pub async fn path_exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

/// Modification time of a local file, `None` if it no longer exists.
pub async fn modified_time(path: &Path) -> Result<Option<DateTime<Utc>>> {
    match fs::metadata(path).await {
        Ok(metadata) => Ok(Some(metadata.modified()?.into())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Move a file into an archive directory.
///
/// An existing same-named archive entry is never overwritten; the incoming
/// file gets a `_<unix seconds>` suffix before the extension instead.
pub async fn archive_file(src: &Path, dst_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dst_dir).await?;

    let base = src
        .file_name()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "no file name"))?;
    let mut dst = dst_dir.join(base);

    if fs::try_exists(&dst).await? {
        let stem = src
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let suffixed = match src.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}_{}.{}", stem, Utc::now().timestamp(), ext),
            None => format!("{}_{}", stem, Utc::now().timestamp()),
        };
        dst = dst_dir.join(suffixed);
    }

    // rename does not cross filesystems; fall back to copy + remove
    if fs::rename(src, &dst).await.is_err() {
        fs::copy(src, &dst).await?;
        fs::remove_file(src).await?;
    }

    debug!(src = %src.display(), dst = %dst.display(), "Local archive move");
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_list_filters_suffix_and_missing_dir() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("a.json"), "a").await.unwrap();
        fs::write(tmp.path().join("b.txt"), "b").await.unwrap();

        let files = list_files_with_suffix(tmp.path(), ".json").await.unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("a.json"));

        let missing = list_files_with_suffix(&tmp.path().join("nope"), ".json")
            .await
            .unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_archive_moves_file() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("r.json");
        let bak = tmp.path().join("bak");
        fs::write(&src, "data").await.unwrap();

        let dst = archive_file(&src, &bak).await.unwrap();

        assert!(!src.exists());
        assert_eq!(dst, bak.join("r.json"));
        assert_eq!(fs::read_to_string(&dst).await.unwrap(), "data");
    }

    #[tokio::test]
    async fn test_archive_collision_gets_suffix() {
        let tmp = tempdir().unwrap();
        let bak = tmp.path().join("bak");

        let first = tmp.path().join("r.json");
        fs::write(&first, "one").await.unwrap();
        archive_file(&first, &bak).await.unwrap();

        let second = tmp.path().join("r.json");
        fs::write(&second, "two").await.unwrap();
        let dst = archive_file(&second, &bak).await.unwrap();

        assert_ne!(dst, bak.join("r.json"));
        let name = dst.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("r_") && name.ends_with(".json"), "{}", name);
        // Both contents survive
        assert_eq!(fs::read_to_string(bak.join("r.json")).await.unwrap(), "one");
        assert_eq!(fs::read_to_string(&dst).await.unwrap(), "two");
    }

    #[test]
    fn test_basename_and_stem() {
        assert_eq!(basename("iconml/request/abc.json"), "abc.json");
        assert_eq!(basename("abc.json"), "abc.json");
        assert_eq!(stem_of("abc.json"), "abc");
        assert_eq!(stem_of("noext"), "noext");
    }

    #[tokio::test]
    async fn test_modified_time_missing_is_none() {
        let tmp = tempdir().unwrap();
        assert!(modified_time(&tmp.path().join("gone"))
            .await
            .unwrap()
            .is_none());
    }
}
