//! The backend capability contract.
//!
//! A backend is one storage endpoint (a directory on disk, an rclone
//! remote, ...). Locations hold a shared reference to it and consult it for
//! identity and the read-only flag; everything else is the adapter's job.

use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{Error, Result};

/// Immutable identity of a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendIdentity {
    pub url: String,
    pub name: String,
    pub uuid: Uuid,
}

impl BackendIdentity {
    /// Build an identity, deriving the name from the url and generating a
    /// fresh uuid when they are not given.
    pub fn new(url: impl Into<String>, name: Option<String>, uuid: Option<Uuid>) -> Self {
        let url = url.into();
        let name = name.unwrap_or_else(|| safe_name(&url));
        BackendIdentity {
            url,
            name,
            uuid: uuid.unwrap_or_else(Uuid::new_v4),
        }
    }
}

/// Turn a url into something usable as a file or display name.
pub fn safe_name(url: &str) -> String {
    url.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Outcome of the individual self-test checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CheckStatus {
    pub marker_file: bool,
    pub read: bool,
    pub write: bool,
    pub sundry: bool,
}

/// One timestamped entry of an [`EventLog`].
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Shared, append-only, in-memory event log.
///
/// Cloning gives another handle onto the same log.
#[derive(Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and mirror it to `tracing`.
    pub fn put(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(target: "storeloc::event_log", "{}", message);
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(Event {
                at: Utc::now(),
                message,
            });
        }
    }

    /// Snapshot of all entries.
    pub fn entries(&self) -> Vec<Event> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("entries", &self.len())
            .finish()
    }
}

/// Status report produced by a backend self-test.
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub name: String,
    pub uuid: Uuid,
    pub url: String,
    pub online: bool,
    pub checked: bool,
    /// Free space available for use. A minimum, never an overestimate.
    pub free_space: u64,
    /// Number of files, when cheap enough to compute.
    pub file_count: Option<u64>,
    pub checks: CheckStatus,
    /// Human readable health summary.
    pub health: String,
    #[serde(skip)]
    pub event_log: EventLog,
}

#[derive(Debug, Default)]
struct StateInner {
    online: bool,
    checked: bool,
    last_status: Option<BackendStatus>,
}

/// Identity plus the mutable, self-test-driven state of a backend.
///
/// Concrete backends embed one of these and hand it out through
/// [`Backend::state`].
#[derive(Debug)]
pub struct BackendState {
    identity: BackendIdentity,
    inner: RwLock<StateInner>,
    event_log: EventLog,
}

impl BackendState {
    pub fn new(identity: BackendIdentity) -> Self {
        BackendState {
            identity,
            inner: RwLock::new(StateInner::default()),
            event_log: EventLog::new(),
        }
    }

    pub fn identity(&self) -> &BackendIdentity {
        &self.identity
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn is_online(&self) -> bool {
        self.inner.read().map(|s| s.online).unwrap_or(false)
    }

    pub fn is_checked(&self) -> bool {
        self.inner.read().map(|s| s.checked).unwrap_or(false)
    }

    pub fn set_online(&self, online: bool) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| Error::Bridge("backend state lock poisoned".to_string()))?;
        inner.online = online;
        Ok(())
    }

    /// Store a fresh report, updating the online/checked flags from it.
    pub fn record(&self, status: &BackendStatus) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| Error::Bridge("backend state lock poisoned".to_string()))?;
        inner.online = status.online;
        inner.checked = status.checked;
        inner.last_status = Some(status.clone());
        Ok(())
    }

    pub fn last_status(&self) -> Option<BackendStatus> {
        self.inner.read().ok().and_then(|s| s.last_status.clone())
    }

    /// Start a report pre-filled with this backend's identity.
    pub fn report(&self, checks: CheckStatus, health: impl Into<String>) -> BackendStatus {
        BackendStatus {
            name: self.identity.name.clone(),
            uuid: self.identity.uuid,
            url: self.identity.url.clone(),
            online: false,
            checked: false,
            free_space: 0,
            file_count: None,
            checks,
            health: health.into(),
            event_log: self.event_log.clone(),
        }
    }
}

/// A storage endpoint.
///
/// Implementors provide [`Backend::state`], the read-only flag and the
/// self-test; the rest is derived.
pub trait Backend: Send + Sync + fmt::Debug {
    fn state(&self) -> &BackendState;

    /// True if every mutation must fail with [`Error::ReadOnly`].
    fn is_read_only(&self) -> bool;

    /// Run the backend's checks and report.
    fn self_test(&self) -> Result<BackendStatus>;

    /// Bring the backend up. Defaults to running the self-test.
    fn startup(&self) -> Result<BackendStatus> {
        self.self_test()
    }

    /// Current status. Defaults to re-running the self-test.
    fn status(&self) -> Result<BackendStatus> {
        self.self_test()
    }

    fn identity(&self) -> &BackendIdentity {
        self.state().identity()
    }

    fn name(&self) -> &str {
        &self.identity().name
    }

    fn url(&self) -> &str {
        &self.identity().url
    }

    fn uuid(&self) -> Uuid {
        self.identity().uuid
    }

    fn is_online(&self) -> bool {
        self.state().is_online()
    }

    fn is_checked(&self) -> bool {
        self.state().is_checked()
    }

    fn event_log(&self) -> &EventLog {
        self.state().event_log()
    }

    fn last_status(&self) -> Option<BackendStatus> {
        self.state().last_status()
    }
}

/// Address of the backend object, used for identity comparisons.
pub(crate) fn backend_addr(backend: &Arc<dyn Backend>) -> usize {
    Arc::as_ptr(backend) as *const () as usize
}
