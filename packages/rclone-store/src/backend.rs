//! The rclone remote backend.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use storeloc_core::{
    Backend, BackendIdentity, BackendState, BackendStatus, CheckStatus, Error, Result,
};

use crate::lsjson::parse_list;
use crate::runner::{ProcessRunner, RcloneRunner};

/// How to invoke rclone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RcloneOptions {
    /// Executable name or path, resolved on `PATH`.
    pub rclone_exe: String,
    /// Arguments placed before every command, e.g. `--config`.
    pub rclone_args: Vec<String>,
    /// Extra environment for the child process.
    pub env: BTreeMap<String, String>,
    /// Per-command timeout in seconds. `None` waits forever.
    pub timeout_s: Option<f64>,
}

impl Default for RcloneOptions {
    fn default() -> Self {
        RcloneOptions {
            rclone_exe: "rclone".to_string(),
            rclone_args: Vec::new(),
            env: BTreeMap::new(),
            timeout_s: Some(60.0),
        }
    }
}

impl RcloneOptions {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| Error::validation(format!("invalid rclone backend options: {}", e)))
    }
}

/// A remote reachable through rclone, such as `books:` or `s3:bucket/dir`.
///
/// Always read-only.
pub struct RcloneBackend {
    state: BackendState,
    options: RcloneOptions,
    runner: Arc<dyn RcloneRunner>,
}

impl fmt::Debug for RcloneBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RcloneBackend")
            .field("state", &self.state)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl RcloneBackend {
    pub fn new(url: &str, options: RcloneOptions) -> Result<Arc<RcloneBackend>> {
        let runner = Arc::new(ProcessRunner::new(&options));
        Self::with_runner(BackendIdentity::new(url, None, None), options, runner)
    }

    /// Build a backend that sends its commands to `runner`.
    pub fn with_runner(
        identity: BackendIdentity,
        options: RcloneOptions,
        runner: Arc<dyn RcloneRunner>,
    ) -> Result<Arc<RcloneBackend>> {
        if identity.url.is_empty() {
            return Err(Error::validation("rclone backend needs a remote url"));
        }
        Ok(Arc::new(RcloneBackend {
            state: BackendState::new(identity),
            options,
            runner,
        }))
    }

    pub fn options(&self) -> &RcloneOptions {
        &self.options
    }

    pub(crate) fn runner(&self) -> &dyn RcloneRunner {
        self.runner.as_ref()
    }

    /// The rclone path of `rel`, a `/`-joined path relative to the remote.
    pub fn join(&self, rel: &str) -> String {
        let url = self.url();
        if rel.is_empty() {
            url.to_string()
        } else if url.ends_with(':') {
            format!("{}{}", url, rel)
        } else {
            format!("{}/{}", url.trim_end_matches('/'), rel)
        }
    }

    /// Every file of the remote, as full rclone paths.
    pub fn iter_files(&self) -> Result<Vec<String>> {
        let url = self.url().to_string();
        let out = self
            .runner
            .run(&args(&["lsjson", "-R", "--files-only", &url]))?
            .check(&url)?;
        Ok(parse_list(&out.stdout, &url)?
            .into_iter()
            .filter(|entry| !entry.is_dir)
            .map(|entry| self.join(&entry.path))
            .collect())
    }
}

pub(crate) fn args(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

impl Backend for RcloneBackend {
    fn state(&self) -> &BackendState {
        &self.state
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn startup(&self) -> Result<BackendStatus> {
        let out = self.runner.run(&args(&["version"]))?.check(self.url())?;
        let stdout = String::from_utf8_lossy(&out.stdout);
        tracing::info!(
            backend = %self.name(),
            version = stdout.lines().next().unwrap_or("unknown"),
            "rclone backend starting"
        );
        self.state.set_online(true)?;
        self.self_test()
    }

    /// A shallow listing of the remote root.
    fn self_test(&self) -> Result<BackendStatus> {
        let url = self.url().to_string();
        let listed = self
            .runner
            .run(&args(&["lsjson", "--max-depth", "1", &url]))
            .and_then(|out| out.check(&url))
            .and_then(|out| parse_list(&out.stdout, &url));

        let (checks, health) = match listed {
            Ok(_) => (
                CheckStatus {
                    marker_file: false,
                    read: true,
                    write: false,
                    sundry: true,
                },
                "ok (read-only)",
            ),
            Err(e) => {
                tracing::warn!(backend = %self.name(), error = %e, "rclone self-test failed");
                self.event_log()
                    .put(format!("listing {} failed: {}", url, e));
                (CheckStatus::default(), "unhealthy")
            }
        };
        let mut status = self.state.report(checks, health);
        status.online = checks.read;
        status.checked = true;
        self.state.record(&status)?;
        tracing::info!(
            backend = %self.name(),
            online = status.online,
            health = %status.health,
            "rclone backend self-test finished"
        );
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::mock::MockRunner;
    use serde_json::json;

    fn backend(url: &str, runner: MockRunner) -> Arc<RcloneBackend> {
        RcloneBackend::with_runner(
            BackendIdentity::new(url, None, None),
            RcloneOptions::default(),
            Arc::new(runner),
        )
        .unwrap()
    }

    #[test]
    fn test_options_defaults() {
        let options = RcloneOptions::from_json(r#"{"rclone_args": ["--config", "x.conf"]}"#)
            .unwrap();
        assert_eq!(options.rclone_exe, "rclone");
        assert_eq!(options.rclone_args, vec!["--config", "x.conf"]);
        assert_eq!(options.timeout_s, Some(60.0));
        assert!(RcloneOptions::from_json("[]").unwrap_err().is_validation());
    }

    #[test]
    fn test_join() {
        let runner = MockRunner::new();
        assert_eq!(backend("books:", runner.clone()).join("a/b"), "books:a/b");
        assert_eq!(backend("s3:bucket/", runner.clone()).join("a"), "s3:bucket/a");
        assert_eq!(backend("s3:bucket", runner.clone()).join("a"), "s3:bucket/a");
        assert_eq!(backend("s3:bucket", runner).join(""), "s3:bucket");
    }

    #[test]
    fn test_startup_and_self_test() {
        let runner = MockRunner::new()
            .with_json("version", json!("rclone v1.66.0"))
            .with_json("lsjson --max-depth 1 books:", json!([]));
        let backend = backend("books:", runner.clone());
        assert!(!backend.is_checked());

        let status = backend.startup().unwrap();
        assert!(status.online);
        assert!(status.checked);
        assert_eq!(status.health, "ok (read-only)");
        assert!(status.checks.read);
        assert!(!status.checks.write);
        // no marker object is looked for on a remote
        assert!(!status.checks.marker_file);
        assert_eq!(status.free_space, 0);
        assert!(backend.is_read_only());
        assert_eq!(runner.recorded(), vec!["version", "lsjson --max-depth 1 books:"]);
    }

    #[test]
    fn test_failed_self_test_is_logged() {
        let runner = MockRunner::new().with_exit("lsjson --max-depth 1 books:", 1, "no such remote");
        let backend = backend("books:", runner);
        let status = backend.self_test().unwrap();
        assert!(!status.online);
        assert_eq!(status.health, "unhealthy");
        assert_eq!(backend.event_log().len(), 1);
        assert!(backend.event_log().entries()[0].message.contains("no such remote"));
    }

    #[test]
    fn test_iter_files() {
        let runner = MockRunner::new().with_json(
            "lsjson -R --files-only s3:bucket",
            json!([
                {"Path": "a.txt", "Name": "a.txt", "Size": 1, "IsDir": false},
                {"Path": "d/b.txt", "Name": "b.txt", "Size": 2, "IsDir": false}
            ]),
        );
        let files = backend("s3:bucket", runner).iter_files().unwrap();
        assert_eq!(files, vec!["s3:bucket/a.txt", "s3:bucket/d/b.txt"]);
    }
}
