//! Sync-from-async bridge.
//!
//! [`AsyncToSync`] wraps an adapter whose native style suspends and gives
//! it the blocking surface by running each primitive on the [`Scheduler`]
//! thread while the caller waits.
//!
//! `iterdir`/`glob` are drained to completion on the scheduler thread and
//! handed back as an in-memory iterator. The async-from-sync direction
//! streams instead; listings are bounded in practice, so the blocking side
//! trades memory for a simpler iterator.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex as AsyncMutex;

use crate::adapter::EntryIter;
use crate::{
    Adapter, AsyncHandle, AsyncOps, Backend, BlockingHandle, BlockingOps, GlobPattern, Metadata,
    MkdirOptions, OpenOptions, Result, Scheduler, Segments, TouchOptions,
};

/// Blocking facade over an async-native adapter.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use storeloc_core::{AsyncToSync, BlockingOps};
///
/// let blocking = AsyncToSync::new(Arc::new(my_async_adapter));
/// let present = blocking.exists(&segments!("bridges/hello.txt"))?;
/// ```
pub struct AsyncToSync<A> {
    inner: Arc<A>,
    scheduler: &'static Scheduler,
}

impl<A: AsyncOps> AsyncToSync<A> {
    /// Bridge through the process-wide scheduler.
    pub fn new(inner: Arc<A>) -> Self {
        Self::with_scheduler(inner, Scheduler::global())
    }

    pub fn with_scheduler(inner: Arc<A>, scheduler: &'static Scheduler) -> Self {
        AsyncToSync { inner, scheduler }
    }

    pub fn inner(&self) -> &Arc<A> {
        &self.inner
    }

    fn run<T, F, Fut>(&self, op: &'static str, at: &Segments, f: F) -> Result<T>
    where
        F: FnOnce(Arc<A>) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        tracing::debug!(style = self.inner.style(), op, at = %at, "dispatch to scheduler");
        self.scheduler.block_on(f(self.inner.clone()))
    }

    fn drain<F, Fut>(&self, op: &'static str, at: &Segments, f: F) -> Result<EntryIter>
    where
        F: FnOnce(Arc<A>) -> Fut,
        Fut: Future<Output = Result<crate::Listing>> + Send + 'static,
    {
        let items = self.run(op, at, move |inner| {
            let opened = f(inner);
            async move { opened.await?.collect().await }
        })?;
        Ok(Box::new(items.into_iter().map(Ok)))
    }
}

impl<A: AsyncOps> Adapter for AsyncToSync<A> {
    fn style(&self) -> &'static str {
        self.inner.style()
    }

    fn backend(&self) -> Arc<dyn Backend> {
        self.inner.backend()
    }

    fn check_contained(&self, at: &Segments) -> Result<()> {
        self.inner.check_contained(at)
    }

    fn store_key(&self, at: &Segments) -> String {
        self.inner.store_key(at)
    }

    fn native_path(&self, at: &Segments) -> Option<PathBuf> {
        self.inner.native_path(at)
    }

    fn segments_from_native(&self, native: &str) -> Result<Segments> {
        self.inner.segments_from_native(native)
    }
}

impl<A: AsyncOps> BlockingOps for AsyncToSync<A> {
    fn exists(&self, at: &Segments) -> Result<bool> {
        let owned = at.clone();
        self.run("exists", at, move |inner| async move {
            inner.exists(&owned).await
        })
    }

    fn is_file(&self, at: &Segments) -> Result<bool> {
        let owned = at.clone();
        self.run("is_file", at, move |inner| async move {
            inner.is_file(&owned).await
        })
    }

    fn is_dir(&self, at: &Segments) -> Result<bool> {
        let owned = at.clone();
        self.run("is_dir", at, move |inner| async move {
            inner.is_dir(&owned).await
        })
    }

    fn stat(&self, at: &Segments) -> Result<Metadata> {
        let owned = at.clone();
        self.run("stat", at, move |inner| async move {
            inner.stat(&owned).await
        })
    }

    fn mkdir(&self, at: &Segments, options: MkdirOptions) -> Result<()> {
        let owned = at.clone();
        self.run("mkdir", at, move |inner| async move {
            inner.mkdir(&owned, options).await
        })
    }

    fn unlink(&self, at: &Segments, missing_ok: bool) -> Result<()> {
        let owned = at.clone();
        self.run("unlink", at, move |inner| async move {
            inner.unlink(&owned, missing_ok).await
        })
    }

    fn rmdir(&self, at: &Segments) -> Result<()> {
        let owned = at.clone();
        self.run("rmdir", at, move |inner| async move {
            inner.rmdir(&owned).await
        })
    }

    fn rename(&self, at: &Segments, to: &Segments) -> Result<Segments> {
        let (owned, to) = (at.clone(), to.clone());
        self.run("rename", at, move |inner| async move {
            inner.rename(&owned, &to).await
        })
    }

    fn replace(&self, at: &Segments, to: &Segments) -> Result<Segments> {
        let (owned, to) = (at.clone(), to.clone());
        self.run("replace", at, move |inner| async move {
            inner.replace(&owned, &to).await
        })
    }

    fn touch(&self, at: &Segments, options: TouchOptions) -> Result<()> {
        let owned = at.clone();
        self.run("touch", at, move |inner| async move {
            inner.touch(&owned, options).await
        })
    }

    fn iterdir(&self, at: &Segments) -> Result<EntryIter> {
        let owned = at.clone();
        self.drain("iterdir", at, move |inner| async move {
            inner.iterdir(&owned).await
        })
    }

    fn glob(&self, at: &Segments, pattern: &GlobPattern) -> Result<EntryIter> {
        let (owned, pattern) = (at.clone(), pattern.clone());
        self.drain("glob", at, move |inner| async move {
            inner.glob(&owned, &pattern).await
        })
    }

    fn open(&self, at: &Segments, options: &OpenOptions) -> Result<Box<dyn BlockingHandle>> {
        let (owned, options) = (at.clone(), options.clone());
        let handle = self.run("open", at, move |inner| async move {
            inner.open(&owned, &options).await
        })?;
        Ok(Box::new(ScheduledHandle::new(handle, self.scheduler)))
    }
}

/// Blocking handle forwarding every operation to an async handle on the
/// scheduler thread.
pub struct ScheduledHandle {
    inner: Option<Arc<AsyncMutex<Box<dyn AsyncHandle>>>>,
    scheduler: &'static Scheduler,
}

impl ScheduledHandle {
    pub fn new(inner: Box<dyn AsyncHandle>, scheduler: &'static Scheduler) -> Self {
        ScheduledHandle {
            inner: Some(Arc::new(AsyncMutex::new(inner))),
            scheduler,
        }
    }

    fn handle(&self) -> Result<Arc<AsyncMutex<Box<dyn AsyncHandle>>>> {
        self.inner
            .clone()
            .ok_or_else(|| crate::Error::validation("I/O operation on closed file"))
    }
}

impl BlockingHandle for ScheduledHandle {
    fn read(&mut self, max: Option<usize>) -> Result<Bytes> {
        let handle = self.handle()?;
        self.scheduler
            .block_on(async move { handle.lock().await.read(max).await })
    }

    fn write(&mut self, data: Bytes) -> Result<usize> {
        let handle = self.handle()?;
        self.scheduler
            .block_on(async move { handle.lock().await.write(data).await })
    }

    fn flush(&mut self) -> Result<()> {
        let handle = self.handle()?;
        self.scheduler
            .block_on(async move { handle.lock().await.flush().await })
    }

    fn close(&mut self) -> Result<()> {
        match self.inner.take() {
            Some(handle) => self
                .scheduler
                .block_on(async move { handle.lock().await.close().await }),
            None => Ok(()),
        }
    }
}

impl Drop for ScheduledHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.inner.take() {
            let closing = async move {
                if let Err(e) = handle.lock().await.close().await {
                    tracing::warn!(error = %e, "failed to close bridged handle on drop");
                }
            };
            if let Err(closing) = self.scheduler.spawn_if_running(closing) {
                close_without_scheduler(closing);
            }
        }
    }
}

/// Finish a drop-time close after the scheduler was stopped, without
/// starting it again.
fn close_without_scheduler<F>(closing: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(current) = tokio::runtime::Handle::try_current() {
        current.spawn(closing);
        return;
    }
    match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime.block_on(closing),
        Err(e) => tracing::warn!(error = %e, "could not close bridged handle on drop"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;

    struct Recorder {
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl AsyncHandle for Recorder {
        async fn read(&mut self, _max: Option<usize>) -> Result<Bytes> {
            Ok(Bytes::new())
        }

        async fn write(&mut self, data: Bytes) -> Result<usize> {
            Ok(data.len())
        }

        async fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn leaked() -> &'static Scheduler {
        Box::leak(Box::new(Scheduler::new()))
    }

    #[test]
    fn drop_closes_on_the_running_scheduler() {
        let scheduler = leaked();
        let closed = Arc::new(AtomicBool::new(false));
        let mut handle = ScheduledHandle::new(
            Box::new(Recorder {
                closed: closed.clone(),
            }),
            scheduler,
        );
        assert!(handle.read(None).unwrap().is_empty());
        drop(handle);
        // drain the scheduler so the detached close has run
        scheduler.block_on(async { Ok(()) }).unwrap();
        scheduler.stop().unwrap();
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn drop_after_stop_does_not_restart_the_scheduler() {
        let scheduler = leaked();
        let closed = Arc::new(AtomicBool::new(false));
        let mut handle = ScheduledHandle::new(
            Box::new(Recorder {
                closed: closed.clone(),
            }),
            scheduler,
        );
        handle.write(Bytes::from_static(b"x")).unwrap();
        scheduler.stop().unwrap();

        drop(handle);
        assert!(!scheduler.is_running());
        assert!(closed.load(Ordering::SeqCst));
    }
}
