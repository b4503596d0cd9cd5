//! Parsing of `rclone lsjson` output.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use storeloc_core::{EntryKind, Error, Metadata, Result};

/// One object as reported by `lsjson`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LsJsonEntry {
    /// Path relative to the listed directory.
    pub path: String,
    pub name: String,
    /// `-1` for directories and objects of unknown size.
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub mod_time: Option<String>,
    #[serde(default)]
    pub is_dir: bool,
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl LsJsonEntry {
    /// The path split into its non-empty parts.
    pub fn rel_path(&self) -> Vec<&str> {
        self.path.split('/').filter(|p| !p.is_empty()).collect()
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.mod_time
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|t| t.with_timezone(&Utc))
    }

    /// Remote objects are never writable through this backend.
    pub fn metadata(&self) -> Metadata {
        Metadata {
            kind: if self.is_dir {
                EntryKind::Dir
            } else {
                EntryKind::File
            },
            size: u64::try_from(self.size).unwrap_or(0),
            modified: self.modified(),
            readonly: true,
            mode: Some(0o444),
        }
    }
}

pub fn parse_list(stdout: &[u8], key: &str) -> Result<Vec<LsJsonEntry>> {
    serde_json::from_slice(stdout).map_err(|e| bad_output(key, e))
}

/// Output of `lsjson --stat`, a single object.
pub fn parse_stat(stdout: &[u8], key: &str) -> Result<LsJsonEntry> {
    serde_json::from_slice(stdout).map_err(|e| bad_output(key, e))
}

fn bad_output(key: &str, e: serde_json::Error) -> Error {
    Error::Io {
        key: key.to_string(),
        source: std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unreadable lsjson output: {}", e),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"[
        {"Path":"books","Name":"books","Size":-1,"MimeType":"inode/directory","ModTime":"2024-03-01T10:00:00Z","IsDir":true},
        {"Path":"books/a.epub","Name":"a.epub","Size":1234,"MimeType":"application/epub+zip","ModTime":"2024-03-02T11:30:00.123456789+01:00","IsDir":false}
    ]"#;

    #[test]
    fn test_listing_parses() {
        let entries = parse_list(LISTING.as_bytes(), "r:").unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_dir);
        assert_eq!(entries[1].rel_path(), vec!["books", "a.epub"]);
        assert_eq!(entries[1].mime_type.as_deref(), Some("application/epub+zip"));
    }

    #[test]
    fn test_metadata_is_read_only() {
        let entries = parse_list(LISTING.as_bytes(), "r:").unwrap();
        let dir = entries[0].metadata();
        assert!(dir.is_dir());
        assert_eq!(dir.size, 0);

        let file = entries[1].metadata();
        assert!(file.is_file());
        assert_eq!(file.size, 1234);
        assert!(file.readonly);
        assert_eq!(file.mode, Some(0o444));
        let modified = file.modified.unwrap();
        assert_eq!(modified.to_rfc3339(), "2024-03-02T10:30:00.123456789+00:00");
    }

    #[test]
    fn test_stat_and_missing_fields() {
        let entry = parse_stat(br#"{"Path":"x","Name":"x"}"#, "r:x").unwrap();
        assert!(!entry.is_dir);
        assert_eq!(entry.size, 0);
        assert_eq!(entry.modified(), None);

        let bad = parse_stat(b"not json", "r:x").unwrap_err();
        assert!(matches!(bad, Error::Io { .. }));
    }
}
