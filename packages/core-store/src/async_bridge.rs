//! Async-from-sync bridge.
//!
//! [`SyncToAsync`] wraps an adapter whose native style blocks and gives it
//! the async surface. Every primitive is offloaded to tokio's blocking pool
//! with `spawn_blocking`, so the calling task never blocks its executor.
//!
//! Offloaded work runs to completion even if the awaiting task is
//! cancelled; cancellation only discards the result.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    Adapter, AsyncHandle, AsyncOps, Backend, BlockingHandle, BlockingOps, Error, GlobPattern,
    Listing, Metadata, MkdirOptions, OpenOptions, Result, Segments, TouchOptions,
};

/// Run a blocking closure on the blocking pool and await its result.
///
/// A panic in the closure is resumed in the awaiting task.
pub async fn offload<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(Error::Bridge(format!("blocking worker cancelled: {}", e))),
    }
}

/// Async facade over a blocking-native adapter.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use storeloc_core::{AsyncOps, SyncToAsync};
///
/// let facade = SyncToAsync::new(Arc::new(my_blocking_adapter));
/// let present = facade.exists(&segments!("ar/src.txt")).await?;
/// ```
pub struct SyncToAsync<A> {
    inner: Arc<A>,
}

impl<A: BlockingOps> SyncToAsync<A> {
    pub fn new(inner: Arc<A>) -> Self {
        SyncToAsync { inner }
    }

    pub fn inner(&self) -> &Arc<A> {
        &self.inner
    }

    async fn run<T, F>(&self, op: &'static str, at: &Segments, f: F) -> Result<T>
    where
        F: FnOnce(&A, &Segments) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        tracing::debug!(style = self.inner.style(), op, at = %at, "offload to blocking pool");
        let inner = self.inner.clone();
        let at = at.clone();
        offload(move || f(&inner, &at)).await
    }
}

impl<A: BlockingOps> Adapter for SyncToAsync<A> {
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

#[async_trait]
impl<A: BlockingOps> AsyncOps for SyncToAsync<A> {
    async fn exists(&self, at: &Segments) -> Result<bool> {
        self.run("exists", at, |a, at| a.exists(at)).await
    }

    async fn is_file(&self, at: &Segments) -> Result<bool> {
        self.run("is_file", at, |a, at| a.is_file(at)).await
    }

    async fn is_dir(&self, at: &Segments) -> Result<bool> {
        self.run("is_dir", at, |a, at| a.is_dir(at)).await
    }

    async fn stat(&self, at: &Segments) -> Result<Metadata> {
        self.run("stat", at, |a, at| a.stat(at)).await
    }

    async fn mkdir(&self, at: &Segments, options: MkdirOptions) -> Result<()> {
        self.run("mkdir", at, move |a, at| a.mkdir(at, options))
            .await
    }

    async fn unlink(&self, at: &Segments, missing_ok: bool) -> Result<()> {
        self.run("unlink", at, move |a, at| a.unlink(at, missing_ok))
            .await
    }

    async fn rmdir(&self, at: &Segments) -> Result<()> {
        self.run("rmdir", at, |a, at| a.rmdir(at)).await
    }

    async fn rename(&self, at: &Segments, to: &Segments) -> Result<Segments> {
        let to = to.clone();
        self.run("rename", at, move |a, at| a.rename(at, &to)).await
    }

    async fn replace(&self, at: &Segments, to: &Segments) -> Result<Segments> {
        let to = to.clone();
        self.run("replace", at, move |a, at| a.replace(at, &to))
            .await
    }

    async fn touch(&self, at: &Segments, options: TouchOptions) -> Result<()> {
        self.run("touch", at, move |a, at| a.touch(at, options))
            .await
    }

    async fn iterdir(&self, at: &Segments) -> Result<Listing> {
        tracing::debug!(style = self.inner.style(), at = %at, "stream iterdir");
        let inner = self.inner.clone();
        let at = at.clone();
        Ok(Listing::from_blocking(move || inner.iterdir(&at)))
    }

    async fn glob(&self, at: &Segments, pattern: &GlobPattern) -> Result<Listing> {
        tracing::debug!(style = self.inner.style(), at = %at, pattern = %pattern, "stream glob");
        let inner = self.inner.clone();
        let at = at.clone();
        let pattern = pattern.clone();
        Ok(Listing::from_blocking(move || inner.glob(&at, &pattern)))
    }

    async fn open(&self, at: &Segments, options: &OpenOptions) -> Result<Box<dyn AsyncHandle>> {
        let options = options.clone();
        let handle = self
            .run("open", at, move |a, at| a.open(at, &options))
            .await?;
        Ok(Box::new(OffloadedHandle::new(handle)))
    }
}

type SharedBlocking = Arc<Mutex<Option<Box<dyn BlockingHandle>>>>;

/// Async handle whose every operation runs the blocking handle on the
/// blocking pool.
pub struct OffloadedHandle {
    inner: SharedBlocking,
}

impl OffloadedHandle {
    pub fn new(inner: Box<dyn BlockingHandle>) -> Self {
        OffloadedHandle {
            inner: Arc::new(Mutex::new(Some(inner))),
        }
    }

    async fn with<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn BlockingHandle) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let shared = self.inner.clone();
        offload(move || {
            let mut guard = shared
                .lock()
                .map_err(|_| Error::Bridge("file handle lock poisoned".to_string()))?;
            match guard.as_mut() {
                Some(handle) => f(handle.as_mut()),
                None => Err(Error::validation("I/O operation on closed file")),
            }
        })
        .await
    }
}

fn close_shared(shared: &SharedBlocking) -> Result<()> {
    let taken = shared
        .lock()
        .map_err(|_| Error::Bridge("file handle lock poisoned".to_string()))?
        .take();
    match taken {
        Some(mut handle) => handle.close(),
        None => Ok(()),
    }
}

#[async_trait]
impl AsyncHandle for OffloadedHandle {
    async fn read(&mut self, max: Option<usize>) -> Result<Bytes> {
        self.with(move |h| h.read(max)).await
    }

    async fn write(&mut self, data: Bytes) -> Result<usize> {
        self.with(move |h| h.write(data)).await
    }

    async fn flush(&mut self) -> Result<()> {
        self.with(|h| h.flush()).await
    }

    async fn close(&mut self) -> Result<()> {
        let shared = self.inner.clone();
        offload(move || close_shared(&shared)).await
    }
}

impl Drop for OffloadedHandle {
    fn drop(&mut self) {
        let still_open = self.inner.lock().map(|g| g.is_some()).unwrap_or(false);
        if !still_open {
            return;
        }
        let shared = self.inner.clone();
        let closing = move || {
            if let Err(e) = close_shared(&shared) {
                tracing::warn!(error = %e, "failed to close offloaded handle on drop");
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(closing);
            }
            Err(_) => closing(),
        }
    }
}
