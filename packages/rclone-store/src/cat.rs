//! Streaming reads through `rclone cat`.

use std::io::Read;
use std::process::{Child, ChildStdout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use storeloc_core::{BlockingHandle, Error, Result};

use crate::runner::{classify_exit, drain};

const CHUNK: usize = 64 * 1024;

/// Kills the transfer once `timeout` has passed since it started.
struct Watchdog {
    timeout: Duration,
    fired: Arc<AtomicBool>,
    // dropping the sender stops the watchdog thread
    _stop: mpsc::Sender<()>,
}

impl Watchdog {
    fn start(child: Arc<Mutex<Child>>, timeout: Duration) -> Watchdog {
        let (stop, stopped) = mpsc::channel::<()>();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(timeout) {
                if let Ok(mut child) = child.lock() {
                    if matches!(child.try_wait(), Ok(None)) {
                        flag.store(true, Ordering::SeqCst);
                        let _ = child.kill();
                    }
                }
            }
        });
        Watchdog {
            timeout,
            fired,
            _stop: stop,
        }
    }

    fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

/// Read-only, non-seekable handle over a running `rclone cat`.
///
/// The exit status is checked once stdout reaches end of file, so a
/// missing object or a failed transfer surfaces on the read that would
/// otherwise report EOF. stderr is drained on its own thread from the
/// start, and the runner's timeout bounds the whole transfer.
pub struct CatHandle {
    child: Option<Arc<Mutex<Child>>>,
    stdout: Option<ChildStdout>,
    stderr: Option<JoinHandle<Vec<u8>>>,
    watchdog: Option<Watchdog>,
    command: Vec<String>,
    key: String,
    exit_checked: bool,
}

impl CatHandle {
    pub fn new(
        mut child: Child,
        command: Vec<String>,
        key: &str,
        timeout: Option<Duration>,
    ) -> Self {
        let stdout = child.stdout.take();
        let stderr = drain(child.stderr.take());
        let child = Arc::new(Mutex::new(child));
        let watchdog = timeout.map(|timeout| Watchdog::start(child.clone(), timeout));
        CatHandle {
            child: Some(child),
            stdout,
            stderr: Some(stderr),
            watchdog,
            command,
            key: key.to_string(),
            exit_checked: false,
        }
    }

    fn lock(child: &Mutex<Child>) -> Result<MutexGuard<'_, Child>> {
        child
            .lock()
            .map_err(|_| Error::Bridge("rclone process lock poisoned".to_string()))
    }

    /// Reap the process after EOF and turn a failure into an error.
    fn check_exit(&mut self) -> Result<()> {
        if self.exit_checked {
            return Ok(());
        }
        self.exit_checked = true;
        let Some(child) = self.child.clone() else {
            return Ok(());
        };
        // poll so the watchdog can still take the lock and kill
        let status = loop {
            let polled = Self::lock(&child)?
                .try_wait()
                .map_err(|e| Error::from_io(&self.key, e))?;
            match polled {
                Some(status) => break status,
                None => thread::sleep(Duration::from_millis(10)),
            }
        };

        if let Some(watchdog) = self.watchdog.take() {
            if watchdog.fired() {
                return Err(Error::unavailable(format!(
                    "rclone timed out after {:?}: {}",
                    watchdog.timeout,
                    self.command.join(" ")
                )));
            }
        }
        let stderr = match self.stderr.take() {
            Some(reader) => reader
                .join()
                .map_err(|_| Error::Bridge("rclone stderr reader panicked".to_string()))?,
            None => Vec::new(),
        };
        let stderr = String::from_utf8_lossy(&stderr);
        match classify_exit(status.code().unwrap_or(-1), &self.command, &stderr, &self.key) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn fill(&mut self, buf: &mut Vec<u8>, limit: usize) -> Result<()> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Err(Error::validation("I/O operation on closed file"));
        };
        let mut chunk = vec![0u8; CHUNK.min(limit.max(1))];
        while buf.len() < limit {
            let want = chunk.len().min(limit - buf.len());
            let n = match stdout.read(&mut chunk[..want]) {
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::from_io(&self.key, e)),
            };
            if n == 0 {
                return self.check_exit();
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }
}

impl BlockingHandle for CatHandle {
    fn read(&mut self, max: Option<usize>) -> Result<Bytes> {
        let mut buf = Vec::new();
        self.fill(&mut buf, max.unwrap_or(usize::MAX))?;
        Ok(Bytes::from(buf))
    }

    fn write(&mut self, _data: Bytes) -> Result<usize> {
        Err(Error::read_only(&self.key, "write"))
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Stop the transfer if it is still running.
    fn close(&mut self) -> Result<()> {
        self.stdout = None;
        self.watchdog = None;
        if let Some(child) = self.child.take() {
            let mut child = Self::lock(&child)?;
            if matches!(child.try_wait(), Ok(None)) {
                let _ = child.kill();
            }
            let _ = child.wait();
        }
        // the stderr reader ends with the process; it is not joined here
        self.stderr = None;
        Ok(())
    }
}

impl Drop for CatHandle {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
