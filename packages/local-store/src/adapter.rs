//! Blocking-native adapter over `std::fs`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use storeloc_core::{
    Adapter, Backend, BlockingHandle, BlockingOps, EntryIter, Error, GlobPattern, Metadata,
    MkdirOptions, OpenOptions, Result, Segments, TouchOptions,
};

use crate::handle::{std_options, LocalFile};
use crate::walk::{self, key_of};
use crate::LocalBackend;

pub const LOCAL_STYLE: &str = "local";

/// Adapter whose native style blocks the calling thread.
///
/// ```rust,ignore
/// let binding = Binding::blocking_native(LocalAdapter::new(backend));
/// let notes = Location::new(&binding, ["notes.txt"])?;
/// notes.write_text("hi")?;
/// ```
pub struct LocalAdapter {
    backend: Arc<LocalBackend>,
}

impl LocalAdapter {
    pub fn new(backend: Arc<LocalBackend>) -> Self {
        LocalAdapter { backend }
    }

    fn resolve(&self, at: &Segments) -> Result<PathBuf> {
        self.backend.root().check(at)
    }
}

/// Metadata of an existing path, `None` if it is missing or a file sits
/// where a parent directory should be.
pub(crate) fn existing(
    result: io::Result<fs::Metadata>,
    key: &Path,
) -> Result<Option<fs::Metadata>> {
    match result {
        Ok(md) => Ok(Some(md)),
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
            Ok(None)
        }
        Err(e) => Err(Error::from_io(key_of(key), e)),
    }
}

pub(crate) fn already_exists(path: &Path) -> Error {
    Error::AlreadyExists { key: key_of(path) }
}

impl Adapter for LocalAdapter {
    fn style(&self) -> &'static str {
        LOCAL_STYLE
    }

    fn backend(&self) -> Arc<dyn Backend> {
        self.backend.clone()
    }

    fn check_contained(&self, at: &Segments) -> Result<()> {
        self.resolve(at).map(|_| ())
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

impl BlockingOps for LocalAdapter {
    fn exists(&self, at: &Segments) -> Result<bool> {
        let path = self.resolve(at)?;
        Ok(existing(fs::metadata(&path), &path)?.is_some())
    }

    fn is_file(&self, at: &Segments) -> Result<bool> {
        let path = self.resolve(at)?;
        Ok(existing(fs::metadata(&path), &path)?.is_some_and(|md| md.is_file()))
    }

    fn is_dir(&self, at: &Segments) -> Result<bool> {
        let path = self.resolve(at)?;
        Ok(existing(fs::metadata(&path), &path)?.is_some_and(|md| md.is_dir()))
    }

    fn stat(&self, at: &Segments) -> Result<Metadata> {
        let path = self.resolve(at)?;
        let md = fs::metadata(&path).map_err(|e| Error::from_io(key_of(&path), e))?;
        Ok(Metadata::from_std(&md))
    }

    fn mkdir(&self, at: &Segments, options: MkdirOptions) -> Result<()> {
        let path = self.resolve(at)?;
        if let Some(md) = existing(fs::metadata(&path), &path)? {
            return if options.exist_ok && md.is_dir() {
                Ok(())
            } else {
                Err(already_exists(&path))
            };
        }
        let mut builder = fs::DirBuilder::new();
        builder.recursive(options.parents);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(options.mode);
        }
        match builder.create(&path) {
            Ok(()) => Ok(()),
            Err(e)
                if e.kind() == io::ErrorKind::AlreadyExists && options.exist_ok && path.is_dir() =>
            {
                Ok(())
            }
            Err(e) => Err(Error::from_io(key_of(&path), e)),
        }
    }

    fn unlink(&self, at: &Segments, missing_ok: bool) -> Result<()> {
        let path = self.resolve(at)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if missing_ok && e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::from_io(key_of(&path), e)),
        }
    }

    fn rmdir(&self, at: &Segments) -> Result<()> {
        let path = self.resolve(at)?;
        fs::remove_dir(&path).map_err(|e| Error::from_io(key_of(&path), e))
    }

    fn rename(&self, at: &Segments, to: &Segments) -> Result<Segments> {
        let (from, dest) = self.prepare_move(at, to)?;
        if existing(fs::symlink_metadata(&dest), &dest)?.is_some() {
            return Err(already_exists(&dest));
        }
        fs::rename(&from, &dest).map_err(|e| Error::from_io(key_of(&from), e))?;
        Ok(to.clone())
    }

    fn replace(&self, at: &Segments, to: &Segments) -> Result<Segments> {
        let (from, dest) = self.prepare_move(at, to)?;
        fs::rename(&from, &dest).map_err(|e| Error::from_io(key_of(&from), e))?;
        Ok(to.clone())
    }

    fn touch(&self, at: &Segments, options: TouchOptions) -> Result<()> {
        let path = self.resolve(at)?;
        touch_path(&path, options)
    }

    fn iterdir(&self, at: &Segments) -> Result<EntryIter> {
        let path = self.resolve(at)?;
        walk::read_dir(&path, at)
    }

    fn glob(&self, at: &Segments, pattern: &GlobPattern) -> Result<EntryIter> {
        let path = self.resolve(at)?;
        walk::glob(path, at, pattern)
    }

    fn open(&self, at: &Segments, options: &OpenOptions) -> Result<Box<dyn BlockingHandle>> {
        let path = self.resolve(at)?;
        let file = std_options(options)
            .open(&path)
            .map_err(|e| Error::from_io(key_of(&path), e))?;
        Ok(Box::new(LocalFile::new(file, key_of(&path))))
    }
}

impl LocalAdapter {
    /// Resolve both ends of a move and create the destination's parents.
    fn prepare_move(&self, at: &Segments, to: &Segments) -> Result<(PathBuf, PathBuf)> {
        let from = self.resolve(at)?;
        let dest = self.resolve(to)?;
        if existing(fs::symlink_metadata(&from), &from)?.is_none() {
            return Err(Error::not_found(key_of(&from)));
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::from_io(key_of(parent), e))?;
        }
        Ok((from, dest))
    }
}

/// Create `path` with `options.mode`, or bump its modification time.
pub(crate) fn touch_path(path: &Path, options: TouchOptions) -> Result<()> {
    let mut create = fs::OpenOptions::new();
    create.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        create.mode(options.mode);
    }
    match create.open(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            if !options.exist_ok {
                return Err(already_exists(path));
            }
            if path.is_dir() {
                return Ok(());
            }
            fs::OpenOptions::new()
                .append(true)
                .open(path)
                .and_then(|file| file.set_modified(SystemTime::now()))
                .map_err(|e| Error::from_io(key_of(path), e))
        }
        Err(e) => Err(Error::from_io(key_of(path), e)),
    }
}
