//! Backend-neutral `stat` results.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    Other,
}

/// What `stat` reports about a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub kind: EntryKind,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub readonly: bool,
    /// Unix permission bits, where the backend has them.
    pub mode: Option<u32>,
}

impl Metadata {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    /// Convert a local filesystem `stat` result.
    pub fn from_std(md: &std::fs::Metadata) -> Self {
        let file_type = md.file_type();
        let kind = if file_type.is_file() {
            EntryKind::File
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_symlink() {
            EntryKind::Symlink
        } else {
            EntryKind::Other
        };

        #[cfg(unix)]
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            Some(md.permissions().mode())
        };
        #[cfg(not(unix))]
        let mode = None;

        Metadata {
            kind,
            size: md.len(),
            modified: md.modified().ok().map(DateTime::<Utc>::from),
            readonly: md.permissions().readonly(),
            mode,
        }
    }
}
