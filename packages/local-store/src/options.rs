//! Local backend configuration.

use serde::{Deserialize, Serialize};
use storeloc_core::{Error, Result};

/// Options for a [`crate::LocalBackend`].
///
/// ```rust,ignore
/// let options = LocalOptions::from_json(r#"{"read_only": true}"#)?;
/// assert!(!options.create_root);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalOptions {
    /// Reject every mutation with `Error::ReadOnly`.
    pub read_only: bool,
    /// Create the root directory if it does not exist yet.
    pub create_root: bool,
    /// Walk the whole root on each status report to fill in `file_count`.
    pub count_files: bool,
}

impl LocalOptions {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| Error::validation(format!("invalid local backend options: {}", e)))
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn create_root(mut self, create_root: bool) -> Self {
        self.create_root = create_root;
        self
    }

    pub fn count_files(mut self, count_files: bool) -> Self {
        self.count_files = count_files;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let options = LocalOptions::from_json(r#"{"read_only": true}"#).unwrap();
        assert!(options.read_only);
        assert!(!options.create_root);
        assert!(!options.count_files);
        assert_eq!(LocalOptions::from_json("{}").unwrap(), LocalOptions::default());
    }

    #[test]
    fn test_bad_json_is_validation() {
        let err = LocalOptions::from_json(r#"{"read_only": "yes"}"#).unwrap_err();
        assert!(err.is_validation());
    }
}
