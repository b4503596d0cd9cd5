//! The backend root directory and symlink-safe containment.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use storeloc_core::{Error, Result, Segments};

/// A canonicalized root directory.
///
/// Segments are joined onto the root lexically. Before any operation the
/// joined path is resolved one prefix at a time so that a symlink inside
/// the tree cannot lead outside it.
#[derive(Debug, Clone)]
pub struct LocalRoot {
    canonical: PathBuf,
    given: PathBuf,
}

impl LocalRoot {
    /// Open the root named by `url`, accepting an optional `file://` prefix.
    pub fn open(url: &str, create: bool) -> Result<LocalRoot> {
        let given = PathBuf::from(url.strip_prefix("file://").unwrap_or(url));
        if create {
            fs::create_dir_all(&given).map_err(|e| Error::from_io(given.display().to_string(), e))?;
        }
        let canonical = match fs::canonicalize(&given) {
            Ok(path) => path,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::unavailable(format!(
                    "local root does not exist: {}",
                    given.display()
                )))
            }
            Err(e) => return Err(Error::from_io(given.display().to_string(), e)),
        };
        if !canonical.is_dir() {
            return Err(Error::unavailable(format!(
                "local root is not a directory: {}",
                canonical.display()
            )));
        }
        Ok(LocalRoot { canonical, given })
    }

    pub fn path(&self) -> &Path {
        &self.canonical
    }

    /// `root/seg/...` without touching the filesystem.
    pub fn lexical(&self, at: &Segments) -> PathBuf {
        let mut path = self.canonical.clone();
        path.extend(at.iter());
        path
    }

    /// Check containment of `at` and return its lexical path.
    ///
    /// Walks the existing prefix of the path. Every symlink met on the way
    /// must resolve inside the root; a dangling one is rejected too. The
    /// walk stops at the first component that does not exist.
    pub fn check(&self, at: &Segments) -> Result<PathBuf> {
        let mut current = self.canonical.clone();
        for part in at.iter() {
            current.push(part);
            let md = match fs::symlink_metadata(&current) {
                Ok(md) => md,
                Err(e) if stops_walk(&e) => break,
                Err(e) => return Err(Error::from_io(current.display().to_string(), e)),
            };
            if !md.file_type().is_symlink() {
                continue;
            }
            match fs::canonicalize(&current) {
                Ok(real) if real.starts_with(&self.canonical) => {}
                Ok(real) => {
                    return Err(Error::validation(format!(
                        "{} escapes the backend root via symlink to {}",
                        at,
                        real.display()
                    )))
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(Error::validation(format!(
                        "{} passes through a dangling symlink at {}",
                        at,
                        current.display()
                    )))
                }
                Err(e) => return Err(Error::from_io(current.display().to_string(), e)),
            }
        }
        Ok(self.lexical(at))
    }

    /// Map an absolute path under the root back into segments.
    ///
    /// Both the canonical root and the root as originally given are
    /// accepted as prefixes.
    pub fn segments_from_native(&self, native: &str) -> Result<Segments> {
        let path = Path::new(native);
        let rel = path
            .strip_prefix(&self.canonical)
            .or_else(|_| path.strip_prefix(&self.given))
            .map_err(|_| {
                Error::validation(format!(
                    "{} is outside the backend root {}",
                    native,
                    self.canonical.display()
                ))
            })?;
        Segments::parse_str(&rel.to_string_lossy())
    }
}

fn stops_walk(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}
