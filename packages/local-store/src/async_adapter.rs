//! Suspend-native adapter over `tokio::fs`.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use storeloc_core::{
    offload, Adapter, AsyncHandle, AsyncOps, Backend, Error, GlobPattern, Listing, Metadata,
    MkdirOptions, OpenOptions, Result, Segments, TouchOptions, LISTING_CAPACITY,
};

use crate::adapter::{already_exists, existing, touch_path};
use crate::handle::{std_options, AsyncLocalFile};
use crate::walk::{self, key_of};
use crate::LocalBackend;

pub const ASYNC_LOCAL_STYLE: &str = "local-async";

/// Adapter whose native style suspends; every primitive is an `async fn`.
///
/// It serves the same directory contract as [`crate::LocalAdapter`] and is
/// mostly useful to drive the blocking facade through the scheduler.
pub struct AsyncLocalAdapter {
    backend: Arc<LocalBackend>,
}

impl AsyncLocalAdapter {
    pub fn new(backend: Arc<LocalBackend>) -> Self {
        AsyncLocalAdapter { backend }
    }

    /// Containment walks the path with blocking syscalls, so it runs on the
    /// blocking pool like the rest of `tokio::fs`.
    async fn resolve(&self, at: &Segments) -> Result<PathBuf> {
        let backend = self.backend.clone();
        let at = at.clone();
        offload(move || backend.root().check(&at)).await
    }

    async fn prepare_move(&self, at: &Segments, to: &Segments) -> Result<(PathBuf, PathBuf)> {
        let from = self.resolve(at).await?;
        let dest = self.resolve(to).await?;
        if existing(tokio::fs::symlink_metadata(&from).await, &from)?.is_none() {
            return Err(Error::not_found(key_of(&from)));
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::from_io(key_of(parent), e))?;
        }
        Ok((from, dest))
    }
}

impl Adapter for AsyncLocalAdapter {
    fn style(&self) -> &'static str {
        ASYNC_LOCAL_STYLE
    }

    fn backend(&self) -> Arc<dyn Backend> {
        self.backend.clone()
    }

    fn check_contained(&self, at: &Segments) -> Result<()> {
        self.backend.root().check(at).map(|_| ())
    }

    fn store_key(&self, at: &Segments) -> String {
        key_of(&self.backend.root().lexical(at))
    }

    fn native_path(&self, at: &Segments) -> Option<PathBuf> {
        Some(self.backend.root().lexical(at))
    }

    fn segments_from_native(&self, native: &str) -> Result<Segments> {
        self.backend.root().segments_from_native(native)
    }
}

#[async_trait]
impl AsyncOps for AsyncLocalAdapter {
    async fn exists(&self, at: &Segments) -> Result<bool> {
        let path = self.resolve(at).await?;
        Ok(existing(tokio::fs::metadata(&path).await, &path)?.is_some())
    }

    async fn is_file(&self, at: &Segments) -> Result<bool> {
        let path = self.resolve(at).await?;
        let md = existing(tokio::fs::metadata(&path).await, &path)?;
        Ok(md.is_some_and(|md| md.is_file()))
    }

    async fn is_dir(&self, at: &Segments) -> Result<bool> {
        let path = self.resolve(at).await?;
        let md = existing(tokio::fs::metadata(&path).await, &path)?;
        Ok(md.is_some_and(|md| md.is_dir()))
    }

    async fn stat(&self, at: &Segments) -> Result<Metadata> {
        let path = self.resolve(at).await?;
        let md = tokio::fs::metadata(&path)
            .await
            .map_err(|e| Error::from_io(key_of(&path), e))?;
        Ok(Metadata::from_std(&md))
    }

    async fn mkdir(&self, at: &Segments, options: MkdirOptions) -> Result<()> {
        let path = self.resolve(at).await?;
        if let Some(md) = existing(tokio::fs::metadata(&path).await, &path)? {
            return if options.exist_ok && md.is_dir() {
                Ok(())
            } else {
                Err(already_exists(&path))
            };
        }
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(options.parents);
        #[cfg(unix)]
        builder.mode(options.mode);
        builder
            .create(&path)
            .await
            .map_err(|e| Error::from_io(key_of(&path), e))
    }

    async fn unlink(&self, at: &Segments, missing_ok: bool) -> Result<()> {
        let path = self.resolve(at).await?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if missing_ok && e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::from_io(key_of(&path), e)),
        }
    }

    async fn rmdir(&self, at: &Segments) -> Result<()> {
        let path = self.resolve(at).await?;
        tokio::fs::remove_dir(&path)
            .await
            .map_err(|e| Error::from_io(key_of(&path), e))
    }

    async fn rename(&self, at: &Segments, to: &Segments) -> Result<Segments> {
        let (from, dest) = self.prepare_move(at, to).await?;
        if existing(tokio::fs::symlink_metadata(&dest).await, &dest)?.is_some() {
            return Err(already_exists(&dest));
        }
        tokio::fs::rename(&from, &dest)
            .await
            .map_err(|e| Error::from_io(key_of(&from), e))?;
        Ok(to.clone())
    }

    async fn replace(&self, at: &Segments, to: &Segments) -> Result<Segments> {
        let (from, dest) = self.prepare_move(at, to).await?;
        tokio::fs::rename(&from, &dest)
            .await
            .map_err(|e| Error::from_io(key_of(&from), e))?;
        Ok(to.clone())
    }

    async fn touch(&self, at: &Segments, options: TouchOptions) -> Result<()> {
        let path = self.resolve(at).await?;
        offload(move || touch_path(&path, options)).await
    }

    async fn iterdir(&self, at: &Segments) -> Result<Listing> {
        let path = self.resolve(at).await?;
        let mut entries = tokio::fs::read_dir(&path)
            .await
            .map_err(|e| Error::from_io(key_of(&path), e))?;
        let (tx, listing) = Listing::channel(LISTING_CAPACITY);
        let at = at.clone();
        tokio::spawn(async move {
            loop {
                let item = match entries.next_entry().await {
                    Ok(Some(entry)) => match entry.file_name().to_str() {
                        Some(name) => at.child(name),
                        None => Err(Error::validation(format!(
                            "non UTF-8 file name under {}",
                            at
                        ))),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(Error::from_io(key_of(&path), e))).await;
                        break;
                    }
                };
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
        Ok(listing)
    }

    async fn glob(&self, at: &Segments, pattern: &GlobPattern) -> Result<Listing> {
        let path = self.resolve(at).await?;
        let at = at.clone();
        let pattern = pattern.clone();
        Ok(Listing::from_blocking(move || walk::glob(path, &at, &pattern)))
    }

    async fn open(&self, at: &Segments, options: &OpenOptions) -> Result<Box<dyn AsyncHandle>> {
        let path = self.resolve(at).await?;
        let file = tokio::fs::OpenOptions::from(std_options(options))
            .open(&path)
            .await
            .map_err(|e| Error::from_io(key_of(&path), e))?;
        Ok(Box::new(AsyncLocalFile::new(file, key_of(&path))))
    }
}
