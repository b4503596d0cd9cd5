//! The process-wide scheduler thread behind [`crate::AsyncToSync`].
//!
//! One background thread runs a current-thread tokio runtime. Blocking
//! callers submit futures to it and wait on a channel for the result. The
//! scheduler starts lazily on first use and runs until [`Scheduler::stop`];
//! after a stop, the next submission starts it again.

use std::future::Future;
use std::sync::{mpsc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};

use lazy_static::lazy_static;
use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;

use crate::{Error, Result};

const THREAD_NAME: &str = "storeloc-scheduler";

lazy_static! {
    static ref GLOBAL: Scheduler = Scheduler::new();
}

struct Running {
    handle: Handle,
    shutdown: oneshot::Sender<()>,
    thread: JoinHandle<()>,
    thread_id: ThreadId,
}

/// An explicitly started and stopped scheduler thread.
///
/// Use [`Scheduler::global`] for the shared instance; separate instances
/// are only useful for tests that need isolation.
pub struct Scheduler {
    running: Mutex<Option<Running>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            running: Mutex::new(None),
        }
    }

    /// The process-wide scheduler.
    pub fn global() -> &'static Scheduler {
        &GLOBAL
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Running>>> {
        self.running
            .lock()
            .map_err(|_| Error::Bridge("scheduler lock poisoned".to_string()))
    }

    pub fn is_running(&self) -> bool {
        self.lock().map(|r| r.is_some()).unwrap_or(false)
    }

    /// Start the scheduler thread if it is not running yet.
    ///
    /// Failing to start is returned as [`Error::Bridge`] and not retried.
    pub fn start(&self) -> Result<Handle> {
        let mut running = self.lock()?;
        if let Some(r) = running.as_ref() {
            return Ok(r.handle.clone());
        }

        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let thread = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                let runtime = match Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(runtime.handle().clone()));
                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
                // Dropping the runtime here cancels anything still pending.
            })
            .map_err(|e| Error::Bridge(format!("failed to spawn scheduler thread: {}", e)))?;

        let handle = match ready_rx.recv() {
            Ok(Ok(handle)) => handle,
            Ok(Err(message)) => {
                return Err(Error::Bridge(format!(
                    "failed to build scheduler runtime: {}",
                    message
                )))
            }
            Err(_) => {
                return Err(Error::Bridge(
                    "scheduler thread exited during startup".to_string(),
                ))
            }
        };

        tracing::info!(thread = THREAD_NAME, "bridge scheduler started");
        let thread_id = thread.thread().id();
        *running = Some(Running {
            handle: handle.clone(),
            shutdown: shutdown_tx,
            thread,
            thread_id,
        });
        Ok(handle)
    }

    /// Stop the scheduler thread and wait for it to exit.
    ///
    /// Work still in flight is dropped; its callers get [`Error::Bridge`].
    pub fn stop(&self) -> Result<()> {
        let Some(running) = self.lock()?.take() else {
            return Ok(());
        };
        let _ = running.shutdown.send(());
        if thread::current().id() != running.thread_id {
            running
                .thread
                .join()
                .map_err(|_| Error::Bridge("scheduler thread panicked".to_string()))?;
        }
        tracing::info!(thread = THREAD_NAME, "bridge scheduler stopped");
        Ok(())
    }

    fn submit_handle(&self) -> Result<Handle> {
        {
            let running = self.lock()?;
            if let Some(r) = running.as_ref() {
                if thread::current().id() == r.thread_id {
                    return Err(Error::Bridge(
                        "blocking call issued from the scheduler thread would deadlock"
                            .to_string(),
                    ));
                }
                return Ok(r.handle.clone());
            }
        }
        self.start()
    }

    /// Run `future` on the scheduler thread and block until it finishes.
    ///
    /// The future's own error is returned unchanged. A panic inside it is
    /// resumed on the calling thread.
    pub fn block_on<T, F>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let handle = self.submit_handle()?;
        let (tx, rx) = mpsc::sync_channel(1);
        handle.spawn(async move {
            let outcome = tokio::spawn(future).await;
            let _ = tx.send(outcome);
        });

        match rx.recv() {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) if join_error.is_panic() => {
                std::panic::resume_unwind(join_error.into_panic())
            }
            Ok(Err(_)) => Err(Error::Bridge("operation was cancelled".to_string())),
            Err(_) => Err(Error::Bridge(
                "scheduler stopped before the operation completed".to_string(),
            )),
        }
    }

    /// Run `future` on the scheduler thread without waiting for it.
    ///
    /// A stopped scheduler is left stopped and `future` is handed back.
    pub fn spawn_if_running<F>(&self, future: F) -> std::result::Result<(), F>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = match self.lock() {
            Ok(running) => running.as_ref().map(|r| r.handle.clone()),
            Err(_) => None,
        };
        match handle {
            Some(handle) => {
                handle.spawn(future);
                Ok(())
            }
            None => Err(future),
        }
    }
}
