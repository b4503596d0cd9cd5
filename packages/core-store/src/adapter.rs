//! The native operation surfaces an adapter implements.
//!
//! An adapter implements [`Adapter`] plus exactly one of [`BlockingOps`]
//! or [`AsyncOps`]. The other surface is derived by a bridge:
//! [`crate::SyncToAsync`] or [`crate::AsyncToSync`].
//!
//! All primitives take backend-relative [`Segments`]. Adapters enforce
//! containment on every call; the segments are already free of `..` and
//! absolute parts, but only the adapter knows whether a prefix is a symlink
//! that leads elsewhere.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    AsyncHandle, Backend, BlockingHandle, Error, GlobPattern, Listing, Metadata, MkdirOptions,
    OpenOptions, Result, Segments, TouchOptions,
};

/// Iterator returned by the blocking listing primitives.
pub type EntryIter = Box<dyn Iterator<Item = Result<Segments>> + Send>;

/// Identity and pure (I/O-free or near enough) adapter behaviour.
pub trait Adapter: Send + Sync + 'static {
    /// Tag naming the concrete adapter type. Locations of different styles
    /// never compare equal.
    fn style(&self) -> &'static str;

    /// The backend this adapter serves.
    fn backend(&self) -> Arc<dyn Backend>;

    /// Fail with [`Error::Validation`] if `at` resolves outside the
    /// backend's root.
    fn check_contained(&self, at: &Segments) -> Result<()>;

    /// The exact key the backend uses for `at`.
    fn store_key(&self, at: &Segments) -> String;

    /// The absolute local path for `at`, for adapters backed by the local
    /// filesystem.
    fn native_path(&self, _at: &Segments) -> Option<PathBuf> {
        None
    }

    /// Map an absolute native path back into segments.
    ///
    /// Only paths inside the backend root are accepted. Adapters without a
    /// native namespace reject every absolute path.
    fn segments_from_native(&self, native: &str) -> Result<Segments> {
        Err(Error::validation(format!(
            "absolute target not supported by {} adapter: {}",
            self.style(),
            native
        )))
    }
}

/// Primitives for adapters whose native style blocks.
pub trait BlockingOps: Adapter {
    fn exists(&self, at: &Segments) -> Result<bool>;

    fn is_file(&self, at: &Segments) -> Result<bool>;

    fn is_dir(&self, at: &Segments) -> Result<bool>;

    fn stat(&self, at: &Segments) -> Result<Metadata>;

    fn mkdir(&self, at: &Segments, options: MkdirOptions) -> Result<()>;

    fn unlink(&self, at: &Segments, missing_ok: bool) -> Result<()>;

    fn rmdir(&self, at: &Segments) -> Result<()>;

    /// Move `at` to `to`, failing if `to` exists. Returns the new segments.
    fn rename(&self, at: &Segments, to: &Segments) -> Result<Segments>;

    /// Move `at` to `to`, overwriting it. Returns the new segments.
    fn replace(&self, at: &Segments, to: &Segments) -> Result<Segments>;

    fn touch(&self, at: &Segments, options: TouchOptions) -> Result<()>;

    fn iterdir(&self, at: &Segments) -> Result<EntryIter>;

    /// Entries below `at` matching `pattern`. `rglob` is this with
    /// [`GlobPattern::recursive`].
    fn glob(&self, at: &Segments, pattern: &GlobPattern) -> Result<EntryIter>;

    fn open(&self, at: &Segments, options: &OpenOptions) -> Result<Box<dyn BlockingHandle>>;
}

/// Primitives for adapters whose native style suspends.
#[async_trait]
pub trait AsyncOps: Adapter {
    async fn exists(&self, at: &Segments) -> Result<bool>;

    async fn is_file(&self, at: &Segments) -> Result<bool>;

    async fn is_dir(&self, at: &Segments) -> Result<bool>;

    async fn stat(&self, at: &Segments) -> Result<Metadata>;

    async fn mkdir(&self, at: &Segments, options: MkdirOptions) -> Result<()>;

    async fn unlink(&self, at: &Segments, missing_ok: bool) -> Result<()>;

    async fn rmdir(&self, at: &Segments) -> Result<()>;

    async fn rename(&self, at: &Segments, to: &Segments) -> Result<Segments>;

    async fn replace(&self, at: &Segments, to: &Segments) -> Result<Segments>;

    async fn touch(&self, at: &Segments, options: TouchOptions) -> Result<()>;

    async fn iterdir(&self, at: &Segments) -> Result<Listing>;

    async fn glob(&self, at: &Segments, pattern: &GlobPattern) -> Result<Listing>;

    async fn open(&self, at: &Segments, options: &OpenOptions) -> Result<Box<dyn AsyncHandle>>;
}
