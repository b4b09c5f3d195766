//! # Descriptors and Manifests
//!
//! Parsing for the two structured inputs the relay consumes: per-item work
//! descriptors (`<id>.json`) and batch manifests (`<name>.txt`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::error::{RelayError, Result};

/// One unit-of-work descriptor
///
/// The relay only interprets the identity and asset-reference fields;
/// everything else is opaque worker payload and is preserved as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    /// Self-declared id; the authoritative id is the descriptor filename
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,

    /// Referenced icon file, e.g. `xcwewsss.png`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_filename: Option<String>,

    /// Worker-only metadata fields, passed through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Descriptor {
    /// Load and parse a descriptor file
    pub async fn load(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("<unnamed>")
            .to_string();
        let raw = tokio::fs::read(path)
            .await
            .map_err(|e| RelayError::MalformedDescriptor {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        serde_json::from_slice(&raw).map_err(|e| RelayError::MalformedDescriptor {
            name,
            reason: e.to_string(),
        })
    }

    /// Icon filename without its extension, used as the image-result correlation key
    pub fn icon_stem(&self) -> Option<String> {
        self.icon_filename.as_deref().map(|icon| {
            Path::new(icon)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| icon.to_string())
        })
    }
}

/// Parse a batch manifest: one id per line, blank lines and `#` comments
/// ignored, duplicates dropped, first-seen order preserved.
pub fn parse_manifest(content: &str) -> Vec<String> {
    let mut ids = Vec::new();
    for line in content.lines() {
        let id = line.trim();
        if id.is_empty() || id.starts_with('#') {
            continue;
        }
        if !ids.iter().any(|seen: &String| seen == id) {
            ids.push(id.to_string());
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_descriptor_load_preserves_extras() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("abc.json");
        tokio::fs::write(
            &path,
            r#"{"hash":"abc","icon_filename":"xcwewsss.png","package":"com.example.app","label":"Example"}"#,
        )
        .await
        .unwrap();

        let descriptor = Descriptor::load(&path).await.unwrap();
        assert_eq!(descriptor.hash.as_deref(), Some("abc"));
        assert_eq!(descriptor.icon_filename.as_deref(), Some("xcwewsss.png"));
        assert_eq!(
            descriptor.extra.get("package").and_then(|v| v.as_str()),
            Some("com.example.app")
        );
    }

    #[tokio::test]
    async fn test_descriptor_without_icon() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("abc.json");
        tokio::fs::write(&path, r#"{"hash":"abc"}"#).await.unwrap();

        let descriptor = Descriptor::load(&path).await.unwrap();
        assert!(descriptor.icon_filename.is_none());
        assert!(descriptor.icon_stem().is_none());
    }

    #[tokio::test]
    async fn test_malformed_descriptor_errors() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("bad.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let err = Descriptor::load(&path).await.unwrap_err();
        assert!(matches!(err, RelayError::MalformedDescriptor { .. }));
    }

    #[test]
    fn test_icon_stem_strips_extension() {
        let descriptor = Descriptor {
            hash: None,
            icon_filename: Some("xcwewsss.png".to_string()),
            extra: serde_json::Map::new(),
        };
        assert_eq!(descriptor.icon_stem().as_deref(), Some("xcwewsss"));
    }

    #[test]
    fn test_parse_manifest_skips_blanks_comments_dups() {
        let ids = parse_manifest("A\n\n# comment\nB\n  C  \nA\n");
        assert_eq!(ids, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_parse_manifest_empty() {
        assert!(parse_manifest("# only comments\n\n").is_empty());
    }
}
