//! Blocking-native, read-only adapter over an rclone remote.

use std::sync::Arc;

use storeloc_core::{
    Adapter, Backend, BlockingHandle, BlockingOps, EntryIter, Error, GlobPattern,
    Metadata, MkdirOptions, OpenOptions, Result, Segments, TouchOptions,
};

use crate::backend::args;
use crate::lsjson::{parse_list, parse_stat, LsJsonEntry};
use crate::RcloneBackend;

pub const RCLONE_STYLE: &str = "rclone";

/// Every mutation fails with `Error::ReadOnly`; reads are one rclone
/// command each.
pub struct RcloneAdapter {
    backend: Arc<RcloneBackend>,
}

impl RcloneAdapter {
    pub fn new(backend: Arc<RcloneBackend>) -> Self {
        RcloneAdapter { backend }
    }

    fn path(&self, at: &Segments) -> String {
        self.backend.join(&at.parts().join("/"))
    }

    /// Directory form of the path, as rclone expects for listings.
    fn dir_path(&self, at: &Segments) -> String {
        let path = self.path(at);
        if path.ends_with(':') || path.ends_with('/') {
            path
        } else {
            format!("{}/", path)
        }
    }

    /// `None` if the object does not exist.
    fn lookup(&self, at: &Segments) -> Result<Option<LsJsonEntry>> {
        if at.is_root() {
            return Ok(Some(LsJsonEntry {
                path: String::new(),
                name: String::new(),
                size: -1,
                mod_time: None,
                is_dir: true,
                mime_type: None,
            }));
        }
        let path = self.path(at);
        let out = self.backend.runner().run(&args(&["lsjson", "--stat", &path]))?;
        match out.check(&path) {
            Ok(out) => parse_stat(&out.stdout, &path).map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn list(&self, at: &Segments, extra: &[&str]) -> Result<Vec<LsJsonEntry>> {
        let dir = self.dir_path(at);
        let mut command = vec!["lsjson".to_string()];
        command.extend(args(extra));
        command.push(dir.clone());
        let out = self.backend.runner().run(&command)?.check(&dir)?;
        parse_list(&out.stdout, &dir)
    }

    fn refuse(&self, at: &Segments, operation: &'static str) -> Error {
        Error::read_only(self.path(at), operation)
    }
}

impl Adapter for RcloneAdapter {
    fn style(&self) -> &'static str {
        RCLONE_STYLE
    }

    fn backend(&self) -> Arc<dyn Backend> {
        self.backend.clone()
    }

    /// Remote paths have no symlinks; normalized segments are always inside.
    fn check_contained(&self, _at: &Segments) -> Result<()> {
        Ok(())
    }

    fn store_key(&self, at: &Segments) -> String {
        self.path(at)
    }
}

impl BlockingOps for RcloneAdapter {
    fn exists(&self, at: &Segments) -> Result<bool> {
        Ok(self.lookup(at)?.is_some())
    }

    fn is_file(&self, at: &Segments) -> Result<bool> {
        Ok(self.lookup(at)?.is_some_and(|entry| !entry.is_dir))
    }

    fn is_dir(&self, at: &Segments) -> Result<bool> {
        Ok(self.lookup(at)?.is_some_and(|entry| entry.is_dir))
    }

    fn stat(&self, at: &Segments) -> Result<Metadata> {
        match self.lookup(at)? {
            Some(entry) => Ok(entry.metadata()),
            None => Err(Error::not_found(self.path(at))),
        }
    }

    fn mkdir(&self, at: &Segments, _options: MkdirOptions) -> Result<()> {
        Err(self.refuse(at, "mkdir"))
    }

    fn unlink(&self, at: &Segments, _missing_ok: bool) -> Result<()> {
        Err(self.refuse(at, "unlink"))
    }

    fn rmdir(&self, at: &Segments) -> Result<()> {
        Err(self.refuse(at, "rmdir"))
    }

    fn rename(&self, at: &Segments, _to: &Segments) -> Result<Segments> {
        Err(self.refuse(at, "rename"))
    }

    fn replace(&self, at: &Segments, _to: &Segments) -> Result<Segments> {
        Err(self.refuse(at, "replace"))
    }

    fn touch(&self, at: &Segments, _options: TouchOptions) -> Result<()> {
        Err(self.refuse(at, "touch"))
    }

    fn iterdir(&self, at: &Segments) -> Result<EntryIter> {
        let base = at.clone();
        let entries = self.list(at, &[])?;
        Ok(Box::new(
            entries.into_iter().map(move |entry| base.child(&entry.name)),
        ))
    }

    /// Shallow patterns list one level; bounded ones cap the recursion depth.
    fn glob(&self, at: &Segments, pattern: &GlobPattern) -> Result<EntryIter> {
        let depth;
        let extra: Vec<&str> = match pattern.max_depth() {
            Some(1) => Vec::new(),
            Some(n) => {
                depth = n.to_string();
                vec!["-R", "--max-depth", &depth]
            }
            None => vec!["-R"],
        };
        let entries = match self.list(at, &extra) {
            Ok(entries) => entries,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        };
        let base = at.clone();
        let pattern = pattern.clone();
        Ok(Box::new(entries.into_iter().filter_map(move |entry| {
            let rel = entry.rel_path();
            if !pattern.matches(&rel, entry.is_dir) {
                return None;
            }
            Some(base.join(rel))
        })))
    }

    fn open(&self, at: &Segments, options: &OpenOptions) -> Result<Box<dyn BlockingHandle>> {
        if options.is_mutating() {
            return Err(self.refuse(at, "open for writing"));
        }
        let path = self.path(at);
        self.backend
            .runner()
            .stream(&args(&["cat", &path]), &path)
    }
}
