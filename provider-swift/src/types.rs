//! Swift API response types
//!
//! Data structures for deserializing container listing responses.

use serde::Deserialize;

/// One entry of a `GET <container>?format=json` listing
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectEntry {
    /// Object name (the full key within the container)
    pub name: String,

    /// Object size in bytes
    #[serde(default)]
    pub bytes: u64,

    /// Last-modified timestamp, ISO 8601 without timezone (UTC implied)
    #[serde(default)]
    pub last_modified: Option<String>,

    /// ETag/MD5 of the object
    #[serde(default)]
    pub hash: Option<String>,

    /// Content type
    #[serde(default)]
    pub content_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_entry_parses() {
        let json = r#"{
            "name": "iconml/request/abc.json",
            "bytes": 128,
            "last_modified": "2026-08-05T16:41:49.390270",
            "hash": "d41d8cd98f00b204e9800998ecf8427e",
            "content_type": "application/json"
        }"#;

        let entry: ObjectEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.name, "iconml/request/abc.json");
        assert_eq!(entry.bytes, 128);
        assert!(entry.last_modified.is_some());
    }
}
