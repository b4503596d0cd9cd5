//! The local-directory backend.

use std::path::Path;
use std::sync::Arc;

use storeloc_core::{
    Backend, BackendIdentity, BackendState, BackendStatus, CheckStatus, Result,
};

use crate::free_space::{count_files, free_bytes};
use crate::smoke::SmokeTest;
use crate::{LocalOptions, LocalRoot};

/// A directory on the local filesystem.
///
/// # Example
///
/// ```rust,ignore
/// use storeloc_local::{LocalBackend, LocalOptions};
///
/// let backend = LocalBackend::new("/srv/library", LocalOptions::default())?;
/// let status = backend.startup()?;
/// assert!(status.online);
/// ```
#[derive(Debug)]
pub struct LocalBackend {
    state: BackendState,
    root: LocalRoot,
    options: LocalOptions,
}

impl LocalBackend {
    pub fn new(url: &str, options: LocalOptions) -> Result<Arc<LocalBackend>> {
        Self::with_identity(BackendIdentity::new(url, None, None), options)
    }

    pub fn with_identity(
        identity: BackendIdentity,
        options: LocalOptions,
    ) -> Result<Arc<LocalBackend>> {
        let root = LocalRoot::open(&identity.url, options.create_root)?;
        tracing::debug!(name = %identity.name, root = %root.path().display(), "local backend opened");
        Ok(Arc::new(LocalBackend {
            state: BackendState::new(identity),
            root,
            options,
        }))
    }

    pub fn root(&self) -> &LocalRoot {
        &self.root
    }

    pub fn root_path(&self) -> &Path {
        self.root.path()
    }

    pub fn options(&self) -> &LocalOptions {
        &self.options
    }

    pub fn free_space(&self) -> u64 {
        free_bytes(self.root.path())
    }

    fn read_only_checks(&self) -> (CheckStatus, String) {
        match std::fs::read_dir(self.root.path()) {
            Ok(_) => (
                CheckStatus {
                    marker_file: true,
                    read: true,
                    write: false,
                    sundry: true,
                },
                "ok (read-only)".to_string(),
            ),
            Err(e) => {
                self.event_log()
                    .put(format!("root is not readable: {}", e));
                (CheckStatus::default(), "unhealthy".to_string())
            }
        }
    }

    fn smoke_checks(&self) -> (CheckStatus, String) {
        let report = SmokeTest::new(self.root.path()).run();
        for failure in report.failures() {
            tracing::warn!(
                backend = %self.name(),
                check = failure.name,
                error = failure.error.as_deref().unwrap_or(""),
                "smoke test check failed"
            );
            self.event_log().put(format!(
                "smoke test check {} failed: {}",
                failure.name,
                failure.error.as_deref().unwrap_or("unknown error")
            ));
        }
        let health = if report.ok { "ok" } else { "unhealthy" };
        (report.check_status(), health.to_string())
    }
}

impl Backend for LocalBackend {
    fn state(&self) -> &BackendState {
        &self.state
    }

    fn is_read_only(&self) -> bool {
        self.options.read_only
    }

    /// Write-capable roots get the full I/O smoke test; read-only roots
    /// are only checked for readability.
    fn self_test(&self) -> Result<BackendStatus> {
        let (checks, health) = if self.options.read_only {
            self.read_only_checks()
        } else {
            self.smoke_checks()
        };
        let mut status = self.state.report(checks, health);
        status.online = checks.marker_file && checks.read;
        status.checked = true;
        status.free_space = self.free_space();
        if self.options.count_files {
            status.file_count = Some(count_files(self.root.path()));
        }
        self.state.record(&status)?;
        tracing::info!(
            backend = %self.name(),
            online = status.online,
            health = %status.health,
            "local backend self-test finished"
        );
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_startup_runs_smoke_test() {
        let dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(dir.path().to_str().unwrap(), LocalOptions::default())
            .unwrap();
        assert!(!backend.is_checked());

        let status = backend.startup().unwrap();
        assert!(status.online);
        assert!(status.checked);
        assert_eq!(status.health, "ok");
        assert!(status.checks.write);
        assert_eq!(status.file_count, None);
        assert!(backend.is_online());
        assert_eq!(backend.last_status().unwrap().health, "ok");
        // nothing left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_read_only_skips_writes_and_counts_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let options = LocalOptions::default().read_only(true).count_files(true);
        let backend = LocalBackend::new(dir.path().to_str().unwrap(), options).unwrap();

        let status = backend.self_test().unwrap();
        assert!(status.online);
        assert_eq!(status.health, "ok (read-only)");
        assert!(!status.checks.write);
        assert_eq!(status.file_count, Some(1));
        assert!(backend.is_read_only());
    }

    #[test]
    fn test_identity_defaults_from_url() {
        let dir = TempDir::new().unwrap();
        let url = dir.path().to_str().unwrap();
        let backend = LocalBackend::new(url, LocalOptions::default()).unwrap();
        assert_eq!(backend.url(), url);
        assert_eq!(backend.name(), storeloc_core::safe_name(url));
    }
}
